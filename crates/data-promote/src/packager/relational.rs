//! Relational packager: schema introspection and row extraction into a
//! portable package.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::{PackageFilter, PackageSpec};
use crate::core::Column;
use crate::error::Result;
use crate::package::{
    DatabaseData, Package, PackageKind, PkMapping, PkStrategy, Relationship, TableData,
};
use crate::store::RelationalStore;

/// Builds `database`-kind packages from a relational store.
pub struct RelationalPackager<S> {
    store: Arc<S>,
}

impl<S: RelationalStore> RelationalPackager<S> {
    /// Create a packager over the given store.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Package the requested tables and, when `include_related` is set,
    /// the tables they reference up to `max_depth`.
    ///
    /// Any introspection or query failure aborts the whole operation;
    /// no partial package is produced.
    pub async fn package(&self, spec: &PackageSpec, filter: &PackageFilter) -> Result<Package> {
        info!(
            "Packaging {} table(s) from {} (include_related: {})",
            filter.tables.len(),
            self.store.dialect(),
            filter.include_related
        );

        let mut data = DatabaseData {
            dialect: self.store.dialect().to_string(),
            ..DatabaseData::default()
        };

        let mut processed: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<(String, u32)> =
            filter.tables.iter().map(|t| (t.clone(), 0)).collect();

        while let Some((table, depth)) = queue.pop_front() {
            if !processed.insert(table.clone()) {
                continue;
            }

            let schema = self.store.introspect_table(&table).await?;

            let columns: Vec<Column> = schema
                .columns
                .iter()
                .filter(|c| {
                    let pk = schema.primary_key.iter().any(|p| p.eq_ignore_ascii_case(&c.name));
                    if pk && filter.is_excluded(&table, &c.name) {
                        warn!(
                            "Table {}: primary key column '{}' cannot be excluded, keeping it",
                            table, c.name
                        );
                    }
                    pk || !filter.is_excluded(&table, &c.name)
                })
                .map(|c| {
                    let mut col = c.clone();
                    col.is_primary_key =
                        schema.primary_key.iter().any(|p| p.eq_ignore_ascii_case(&c.name));
                    col
                })
                .collect();

            let column_names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
            let rows = self
                .store
                .fetch_rows(&table, &column_names, filter.where_clause(&table))
                .await?;
            debug!("Table {}: extracted {} row(s)", table, rows.len());

            if schema.has_pk() {
                data.pk_mappings
                    .insert(table.clone(), pk_mapping_for(&schema.primary_key, &columns));
            }

            if filter.include_related {
                for fk in &schema.foreign_keys {
                    if processed.contains(&fk.ref_table) {
                        continue;
                    }
                    if filter.max_depth == 0 || depth + 1 <= filter.max_depth {
                        queue.push_back((fk.ref_table.clone(), depth + 1));
                    } else {
                        // Beyond the traversal bound: skipped, not an error.
                        debug!(
                            "Table {}: related table {} beyond max depth {}, skipping",
                            table, fk.ref_table, filter.max_depth
                        );
                    }
                }
            }

            let row_count = rows.len() as i64;
            data.tables.push(TableData {
                name: table,
                columns,
                primary_key: schema.primary_key,
                foreign_keys: schema.foreign_keys,
                rows,
                row_count,
            });
        }

        data.relationships = flatten_relationships(&data.tables);
        self.capture_sequences(&mut data).await;

        let mut package = Package::new(
            spec.name.clone(),
            spec.version.clone(),
            spec.author.clone(),
            PackageKind::Database,
        );
        package.include_parent = filter.include_related;
        package.database = Some(data);
        package.validate()?;

        info!(
            "Packaged {} table(s) into '{}' v{}",
            package.database.as_ref().map(|d| d.tables.len()).unwrap_or(0),
            package.name,
            package.version
        );
        Ok(package)
    }

    /// Capture current sequence values for auto-increment tables.
    /// Best-effort: a failed read is logged and skipped, never fatal.
    async fn capture_sequences(&self, data: &mut DatabaseData) {
        let auto_tables: Vec<String> = data
            .pk_mappings
            .iter()
            .filter(|(_, m)| m.auto_increment)
            .map(|(t, _)| t.clone())
            .collect();

        for table in auto_tables {
            match self.store.sequence_value(&table).await {
                Ok(Some(value)) => {
                    data.sequence_info.insert(table, value);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Failed to read sequence value for {}: {}", table, e);
                }
            }
        }
    }
}

/// Compute the key mapping strategy from column type signals.
fn pk_mapping_for(primary_key: &[String], columns: &[Column]) -> PkMapping {
    let pk_columns: Vec<&Column> = columns
        .iter()
        .filter(|c| primary_key.iter().any(|p| p.eq_ignore_ascii_case(&c.name)))
        .collect();

    let auto_increment = pk_columns.iter().any(|c| c.is_identity);
    let strategy = if auto_increment {
        PkStrategy::AutoIncrement
    } else if pk_columns.iter().any(|c| c.has_sequence_default()) {
        PkStrategy::Sequence
    } else if !pk_columns.is_empty() && pk_columns.iter().all(|c| c.is_uuid_type()) {
        // uuid keys carry over unchanged; no remapping needed on replay
        debug!("Primary key {:?} is uuid-typed, preserving values", primary_key);
        PkStrategy::Preserve
    } else {
        PkStrategy::Preserve
    };

    PkMapping {
        columns: primary_key.to_vec(),
        auto_increment,
        strategy,
    }
}

/// Flatten the packaged tables' FK descriptors into relationship edges.
fn flatten_relationships(tables: &[TableData]) -> Vec<Relationship> {
    let mut relationships = Vec::new();
    for table in tables {
        for fk in &table.foreign_keys {
            for (source_column, target_column) in fk.columns.iter().zip(&fk.ref_columns) {
                relationships.push(Relationship {
                    source_table: table.name.clone(),
                    source_column: source_column.clone(),
                    target_table: fk.ref_table.clone(),
                    target_column: target_column.clone(),
                    constraint_name: fk.name.clone(),
                    on_delete: fk.on_delete.clone(),
                    on_update: fk.on_update.clone(),
                });
            }
        }
    }
    relationships
}
