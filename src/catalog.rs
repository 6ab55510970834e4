use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, RwLock};
use crate::Result;
use crate::analysis::function_registry;
use crate::expr::{AttributeReference, Expr};
use crate::logical_plan::{LocalRelation, LogicalPlan, SubqueryAlias, TableIdentifier};
use crate::types::Schema;

impl Schema {
    pub fn to_attributes(&self) -> Vec<AttributeReference> {
        self.fields
            .iter()
            .map(|f| AttributeReference::new(f.name.clone(), f.data_type.clone())
                .with_nullability(f.nullable))
            .collect()
    }
}

/// The analyzer's window onto session state: relation and function lookup.
/// Lookups are pure during one analysis run.
pub trait Catalog: Debug + Send + Sync {
    /// Returns the relation's plan, wrapped in a `SubqueryAlias` carrying the
    /// alias (or the table name) as qualifier. Missing tables are an error.
    fn lookup_relation(&self, table: &TableIdentifier, alias: Option<&str>) -> Result<LogicalPlan>;

    fn lookup_function(&self, name: &str, args: Vec<Expr>) -> Result<Expr>;

    fn database_exists(&self, db: &str) -> bool;

    fn table_exists(&self, table: &TableIdentifier) -> bool;
}

/// In-memory catalog over registered temporary views. Each view keeps one
/// canonical set of attribute ids; a query touching the same view twice
/// relies on join de-duplication for fresh ids on the second occurrence.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    tables: RwLock<HashMap<String, LocalRelation>>,
    databases: RwLock<Vec<String>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_table(&self, name: &str, schema: &Schema) {
        let relation = LocalRelation::new(name, schema.to_attributes());
        self.tables
            .write()
            .unwrap()
            .insert(name.to_lowercase(), relation);
    }

    pub fn register_database(&self, name: &str) {
        self.databases.write().unwrap().push(name.to_lowercase());
    }

    fn table_key(table: &TableIdentifier) -> String {
        match &table.database {
            Some(db) => format!("{}.{}", db.to_lowercase(), table.table.to_lowercase()),
            None => table.table.to_lowercase(),
        }
    }
}

impl Catalog for MemoryCatalog {
    fn lookup_relation(&self, table: &TableIdentifier, alias: Option<&str>) -> Result<LogicalPlan> {
        let tables = self.tables.read().unwrap();
        let relation = tables
            .get(&Self::table_key(table))
            .or_else(|| tables.get(&table.table.to_lowercase()))
            .ok_or_else(|| crate::AnalysisError::new(format!("no such table {}", table)))?;
        let qualifier = alias.map(|a| a.to_string()).unwrap_or_else(|| table.table.clone());
        Ok(LogicalPlan::SubqueryAlias(SubqueryAlias::new(
            qualifier,
            Arc::new(LogicalPlan::LocalRelation(relation.clone())),
        )))
    }

    fn lookup_function(&self, name: &str, args: Vec<Expr>) -> Result<Expr> {
        function_registry::lookup_function(name, args)
    }

    fn database_exists(&self, db: &str) -> bool {
        self.databases.read().unwrap().contains(&db.to_lowercase())
    }

    fn table_exists(&self, table: &TableIdentifier) -> bool {
        let tables = self.tables.read().unwrap();
        tables.contains_key(&Self::table_key(table))
            || (table.database.is_none() && tables.contains_key(&table.table.to_lowercase()))
    }
}
