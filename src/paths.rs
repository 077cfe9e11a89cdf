//! Dotted property paths resolved against the relational schema.
//!
//! `address.city` on `Person` becomes a LEFT JOIN through the `Person.address`
//! relation plus the column `city` on the joined alias `people.address`. Deeper paths
//! chain joins; the alias of every join is the root alias followed by the dotted
//! relation prefix, so two different prefixes never share an alias and no join
//! can shadow the root table.

use crate::config::SchemaConfig;
use crate::error::CompileError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinStep {
    pub alias: String,
    pub table: String,
    pub parent_alias: String,
    pub join_column: String,
    pub target_column: String,
    pub to_many: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    /// Joins needed to reach the column, outermost first.
    pub joins: Vec<JoinStep>,
    pub table_alias: String,
    pub column: String,
}

impl ResolvedPath {
    /// Whether any join on the way can multiply the parent row.
    pub fn crosses_to_many(&self) -> bool {
        self.joins.iter().any(|join| join.to_many)
    }
}

pub struct PathResolver<'a> {
    config: &'a SchemaConfig,
    root_entity: &'a str,
    root_alias: String,
}

impl<'a> PathResolver<'a> {
    pub fn new(config: &'a SchemaConfig, root_entity: &'a str) -> Self {
        Self {
            config,
            root_entity,
            root_alias: config.table_name(root_entity),
        }
    }

    pub fn root_alias(&self) -> &str {
        &self.root_alias
    }

    pub fn resolve(&self, path: &str) -> Result<ResolvedPath, CompileError> {
        let segments: Vec<&str> = path.split('.').collect();
        let Some((column, relations)) = segments.split_last() else {
            return Ok(self.root_column(path));
        };

        let mut joins = Vec::with_capacity(relations.len());
        let mut entity = self.root_entity.to_string();
        let mut parent_alias = self.root_alias.clone();
        for (i, segment) in relations.iter().enumerate() {
            let relation =
                self.config
                    .relation(&entity, segment)
                    .ok_or_else(|| CompileError::UnknownRelation {
                        entity: entity.clone(),
                        segment: segment.to_string(),
                    })?;
            let alias = format!("{}.{}", self.root_alias, relations[..=i].join("."));
            joins.push(JoinStep {
                alias: alias.clone(),
                table: self.config.table_name(&relation.target),
                parent_alias: parent_alias.clone(),
                join_column: relation.join_column.clone(),
                target_column: relation.target_column.clone(),
                to_many: relation.to_many,
            });
            entity = relation.target.clone();
            parent_alias = alias;
        }

        Ok(ResolvedPath {
            joins,
            table_alias: parent_alias,
            column: column.to_string(),
        })
    }

    fn root_column(&self, column: &str) -> ResolvedPath {
        ResolvedPath {
            joins: Vec::new(),
            table_alias: self.root_alias.clone(),
            column: column.to_string(),
        }
    }
}
