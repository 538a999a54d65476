//! Relational deployer: dependency-ordered replay of a database package
//! with per-table key strategies and post-insert foreign key rewriting.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::DeploymentOptions;
use crate::core::{FieldValue, KeyValue, Record};
use crate::error::{PromoteError, Result};
use crate::package::{DatabaseData, Package, PkMapping, PkStrategy, TableData};
use crate::store::RelationalStore;

use super::order::table_deploy_order;
use super::record::{DeploymentRecord, DeploymentStatus, KeyPair};

/// Replays a `database`-kind package into a relational store.
///
/// The old-key/new-key maps are owned exclusively by one instance and
/// built during a single [`deploy`](RelationalDeployer::deploy) call;
/// construct a fresh deployer per deploy. The caller is expected to run
/// the whole deploy inside one store transaction.
pub struct RelationalDeployer<S> {
    store: Arc<S>,
    key_mappings: HashMap<String, Vec<KeyPair>>,
    spent: bool,
}

impl<S: RelationalStore> RelationalDeployer<S> {
    /// Create a deployer over the given target store.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            key_mappings: HashMap::new(),
            spent: false,
        }
    }

    /// Deploy a package.
    ///
    /// Structural problems (wrong package kind, invalid options, reuse of
    /// a spent deployer) return an error directly; everything that happens
    /// against the target store is reported through the returned record's
    /// status and error log.
    pub async fn deploy(
        &mut self,
        package: &Package,
        options: &DeploymentOptions,
    ) -> Result<DeploymentRecord> {
        if self.spent {
            return Err(PromoteError::Config(
                "deployer instances are single-use; construct a fresh one per deploy".to_string(),
            ));
        }
        self.spent = true;
        options.validate()?;
        package.validate()?;
        let data = package
            .database
            .as_ref()
            .ok_or_else(|| PromoteError::Package("package has no database payload".to_string()))?;

        let mut record = DeploymentRecord::new(package, self.store.dialect());
        record.metadata.extend(options.metadata.clone());

        if options.dry_run {
            return Ok(self.dry_run(data, options, record));
        }

        info!(
            "Deploying package '{}' v{} ({} tables) to {}",
            package.name,
            package.version,
            data.tables.len(),
            self.store.dialect()
        );

        let order = match table_deploy_order(data) {
            Ok(order) => order,
            Err(e) => {
                record.log_error("deployment", e.to_string());
                record.finalize(DeploymentStatus::Failed);
                return Ok(record);
            }
        };
        debug!("Deploy order: {}", order.join(", "));

        for table_name in &order {
            let Some(table) = data.table(table_name) else {
                continue;
            };
            let mapping = data.pk_mappings.get(table_name);

            match self.deploy_table(table, mapping, options, &mut record).await {
                Ok(()) => {
                    debug!("Table {}: {} mapping(s) recorded", table_name, self.mapping_count(table_name));
                    self.advance_sequence(table_name, data, &mut record).await;
                }
                Err(e) => {
                    record.log_error(table_name, e.to_string());
                    if !options.continue_on_error {
                        self.publish_mappings(&mut record);
                        record.finalize(DeploymentStatus::Failed);
                        return Ok(record);
                    }
                }
            }
        }

        self.rewrite_relationships(data, &mut record).await;
        self.publish_mappings(&mut record);

        let status = if record.has_errors() {
            DeploymentStatus::Failed
        } else {
            DeploymentStatus::Completed
        };
        record.finalize(status);
        info!(
            "Deploy of '{}' finished with status {:?}",
            package.name, record.status
        );
        Ok(record)
    }

    /// Delete everything a deploy wrote, newest dependency level first.
    ///
    /// Rows are identified by the new-key side of the record's mappings
    /// and deleted in reverse dependency order.
    pub async fn rollback(
        &self,
        package: &Package,
        record: &mut DeploymentRecord,
    ) -> Result<()> {
        let data = package
            .database
            .as_ref()
            .ok_or_else(|| PromoteError::Package("package has no database payload".to_string()))?;

        let mut order = table_deploy_order(data)?;
        order.reverse();

        for table_name in &order {
            let Some(pairs) = record.key_mappings.get(table_name) else {
                continue;
            };
            let keys: Vec<KeyValue> = pairs.iter().filter_map(|p| p.new.clone()).collect();
            if keys.is_empty() {
                continue;
            }
            let key_columns = data
                .pk_mappings
                .get(table_name)
                .map(|m| m.columns.clone())
                .or_else(|| data.table(table_name).map(|t| t.primary_key.clone()))
                .unwrap_or_default();

            let deleted = self.store.delete_rows(table_name, &key_columns, &keys).await?;
            info!("Rollback: deleted {} row(s) from {}", deleted, table_name);
        }

        record.finalize(DeploymentStatus::RolledBack);
        Ok(())
    }

    /// Structural validation without touching the target store.
    fn dry_run(
        &self,
        data: &DatabaseData,
        options: &DeploymentOptions,
        mut record: DeploymentRecord,
    ) -> DeploymentRecord {
        info!("Dry run: validating package structure");

        for table in &data.tables {
            if table.name.is_empty() {
                record.log_error("deployment", "package contains a table with an empty name");
            }
        }

        if options.validate_references {
            for rel in &data.relationships {
                if !data.contains_table(&rel.source_table) {
                    record.log_error(
                        &rel.source_table,
                        format!(
                            "relationship {} references source table missing from package",
                            rel.constraint_name
                        ),
                    );
                }
                if !data.contains_table(&rel.target_table) {
                    record.log_error(
                        &rel.target_table,
                        format!(
                            "relationship {} references target table missing from package",
                            rel.constraint_name
                        ),
                    );
                }
            }
        }

        if let Err(e) = table_deploy_order(data) {
            record.log_error("deployment", e.to_string());
        }

        let status = if record.has_errors() {
            DeploymentStatus::Failed
        } else {
            DeploymentStatus::Validated
        };
        record.finalize(status);
        record
    }

    /// Deploy one table's rows in fixed-size batches.
    async fn deploy_table(
        &mut self,
        table: &TableData,
        mapping: Option<&PkMapping>,
        options: &DeploymentOptions,
        record: &mut DeploymentRecord,
    ) -> Result<()> {
        if !self.store.table_exists(&table.name).await? {
            if options.create_missing {
                info!("Creating missing target table {}", table.name);
                self.store.create_table(table).await?;
            } else {
                return Err(PromoteError::deploy(
                    &table.name,
                    "table does not exist in target and create_missing is not set",
                ));
            }
        }

        let key_columns: Vec<String> = mapping
            .map(|m| m.columns.clone())
            .unwrap_or_else(|| table.primary_key.clone());
        let strategy = mapping.map(|m| m.strategy).unwrap_or(PkStrategy::Preserve);

        for batch in table.rows.chunks(options.batch_size) {
            for row in batch {
                match self
                    .deploy_row(&table.name, row, &key_columns, strategy, options)
                    .await
                {
                    Ok(Some(pair)) => {
                        self.key_mappings
                            .entry(table.name.clone())
                            .or_default()
                            .push(pair);
                    }
                    Ok(None) => {}
                    Err(e) if options.continue_on_error => {
                        record.log_error(&table.name, e.to_string());
                    }
                    Err(e) => return Err(e),
                }
            }
            debug!("Table {}: batch of {} row(s) processed", table.name, batch.len());
        }
        Ok(())
    }

    /// Deploy one row, applying the table's key strategy and the
    /// existing-record policy. The returned pair is recorded
    /// unconditionally by the caller, even when the row was skipped.
    async fn deploy_row(
        &self,
        table: &str,
        row: &Record,
        key_columns: &[String],
        strategy: PkStrategy,
        options: &DeploymentOptions,
    ) -> Result<Option<KeyPair>> {
        let old_key = KeyValue::from_record(row, key_columns);

        match strategy {
            PkStrategy::AutoIncrement | PkStrategy::Sequence => {
                // Strip the key columns so the target assigns a new value.
                let mut insert = row.clone();
                for column in key_columns {
                    insert.remove(column);
                }
                let new = self.store.insert_row(table, &insert).await?;
                Ok(old_key.map(|old| KeyPair { old, new }))
            }
            PkStrategy::Uuid => {
                let mut insert = row.clone();
                for column in key_columns {
                    insert.set(column.clone(), FieldValue::Uuid(Uuid::new_v4()));
                }
                let new = KeyValue::from_record(&insert, key_columns);
                self.store.insert_row(table, &insert).await?;
                Ok(old_key.map(|old| KeyPair { old, new }))
            }
            PkStrategy::Preserve => {
                let Some(key) = old_key else {
                    // No usable key: plain insert, nothing to map.
                    self.store.insert_row(table, row).await?;
                    return Ok(None);
                };

                if self.store.row_exists(table, key_columns, &key).await? {
                    if options.skip_existing {
                        return Ok(Some(KeyPair::preserved(key)));
                    }
                    if options.update_existing {
                        self.store.update_row(table, key_columns, &key, row).await?;
                        return Ok(Some(KeyPair::preserved(key)));
                    }
                    return Err(PromoteError::conflict(table, key.to_string()));
                }

                self.store.insert_row(table, row).await?;
                Ok(Some(KeyPair::preserved(key)))
            }
        }
    }

    /// Rewrite foreign key columns using the recorded key mappings.
    ///
    /// Only relationships whose source and target tables both produced
    /// mappings are touched. The whole old-to-new map goes to the store
    /// as one call per relationship; applying pairs one at a time would
    /// let a rewritten value re-match a later pair whenever the old and
    /// new key spaces overlap. Failures log warnings and never abort.
    async fn rewrite_relationships(&self, data: &DatabaseData, record: &mut DeploymentRecord) {
        for rel in &data.relationships {
            if !self.key_mappings.contains_key(&rel.source_table) {
                continue;
            }
            let Some(target_pairs) = self.key_mappings.get(&rel.target_table) else {
                continue;
            };

            let mapping: Vec<(FieldValue, FieldValue)> = target_pairs
                .iter()
                .filter_map(|pair| {
                    let new = pair.new.as_ref()?;
                    if *new == pair.old {
                        return None;
                    }
                    Some((pair.old.to_field()?, new.to_field()?))
                })
                .collect();
            if mapping.is_empty() {
                continue;
            }

            match self
                .store
                .rewrite_foreign_keys(&rel.source_table, &rel.source_column, &mapping)
                .await
            {
                Ok(changed) if changed > 0 => {
                    debug!(
                        "Rewrote {}.{}: {} row(s) across {} key pair(s)",
                        rel.source_table,
                        rel.source_column,
                        changed,
                        mapping.len()
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        "FK rewrite failed for {}.{}: {}",
                        rel.source_table, rel.source_column, e
                    );
                    record.log_warning(
                        &rel.source_table,
                        format!("FK rewrite failed on {}: {}", rel.source_column, e),
                    );
                }
            }
        }
    }

    /// Push the target's sequence past the packaged source value, so
    /// inserts after a preserved-key replay start beyond the deployed
    /// keys. Best-effort: a failed update is logged and skipped, like
    /// sequence capture on the packaging side.
    async fn advance_sequence(&self, table: &str, data: &DatabaseData, record: &mut DeploymentRecord) {
        let Some(&value) = data.sequence_info.get(table) else {
            return;
        };
        match self.store.advance_sequence(table, value).await {
            Ok(()) => debug!("Table {}: sequence advanced to {}", table, value),
            Err(e) => {
                warn!("Failed to advance sequence for {}: {}", table, e);
                record.log_warning(table, format!("sequence advance to {} failed: {}", value, e));
            }
        }
    }

    fn mapping_count(&self, table: &str) -> usize {
        self.key_mappings.get(table).map(Vec::len).unwrap_or(0)
    }

    /// Copy the accumulated mappings onto the record.
    fn publish_mappings(&self, record: &mut DeploymentRecord) {
        for (table, pairs) in &self.key_mappings {
            record
                .key_mappings
                .entry(table.clone())
                .or_default()
                .extend(pairs.iter().cloned());
        }
    }
}
