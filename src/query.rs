//! Query aggregates: filter, sort, pagination, projection and the preprocessing fold.

use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::ast::{Condition, GroupBy, Select, Sort};
use crate::error::ValidationError;
use crate::native::Native;

/// One-based page number and page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    page: u64,
    page_size: u64,
}

impl Pagination {
    /// Both values must be at least one, and the offset of the page must fit in an `i64`
    /// so that every backend can carry it.
    pub fn new(page: u64, page_size: u64) -> Result<Self, ValidationError> {
        let limit = i64::MAX as u64;
        let offset = page.checked_sub(1).and_then(|skipped| skipped.checked_mul(page_size));
        match offset {
            Some(offset) if page_size > 0 && page_size <= limit && offset <= limit => {
                Ok(Self { page, page_size })
            }
            _ => Err(ValidationError::Pagination { page, page_size }),
        }
    }

    pub fn page(&self) -> u64 {
        self.page
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn offset(&self) -> u64 {
        self.page_size.saturating_mul(self.page.saturating_sub(1))
    }
}

/// A pure rewrite applied to a query before compilation.
pub struct Preprocessor<Q> {
    name: String,
    rewrite: Arc<dyn Fn(Q) -> Q + Send + Sync>,
}

impl<Q> Preprocessor<Q> {
    pub fn new(name: impl Into<String>, rewrite: impl Fn(Q) -> Q + Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            rewrite: Arc::new(rewrite),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn apply(&self, query: Q) -> Q {
        (self.rewrite)(query)
    }
}

impl<Q> Clone for Preprocessor<Q> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            rewrite: Arc::clone(&self.rewrite),
        }
    }
}

impl<Q> fmt::Debug for Preprocessor<Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Preprocessor({})", self.name)
    }
}

impl<Q> PartialEq for Preprocessor<Q> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.rewrite, &other.rewrite)
    }
}

fn fold_preprocessors<Q>(query: Q, preprocessors: &[Preprocessor<Q>]) -> Q {
    preprocessors.iter().fold(query, |acc, preprocessor| {
        trace!(preprocessor = preprocessor.name(), "applying preprocessor");
        preprocessor.apply(acc)
    })
}

/// An entity-returning query.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    filter: Option<Condition>,
    sort: Vec<Sort>,
    pagination: Option<Pagination>,
    distinct: bool,
    select: Option<Select>,
    preprocessors: Vec<Preprocessor<Query>>,
    customizers: Vec<Native>,
}

impl Query {
    pub fn builder() -> QueryBuilder {
        QueryBuilder::default()
    }

    pub fn to_builder(&self) -> QueryBuilder {
        QueryBuilder {
            query: self.clone(),
        }
    }

    pub fn filter(&self) -> Option<&Condition> {
        self.filter.as_ref()
    }

    pub fn sort(&self) -> &[Sort] {
        &self.sort
    }

    pub fn pagination(&self) -> Option<Pagination> {
        self.pagination
    }

    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    pub fn select(&self) -> Option<&Select> {
        self.select.as_ref()
    }

    pub fn preprocessors(&self) -> &[Preprocessor<Query>] {
        &self.preprocessors
    }

    pub fn customizers(&self) -> &[Native] {
        &self.customizers
    }

    pub fn has_filter(&self) -> bool {
        self.filter.as_ref().is_some_and(|f| !f.is_empty())
    }

    pub fn has_sort(&self) -> bool {
        !self.sort.is_empty()
    }

    pub fn has_pagination(&self) -> bool {
        self.pagination.is_some()
    }

    pub fn has_select(&self) -> bool {
        self.select.as_ref().is_some_and(|s| !s.is_empty())
    }

    /// Runs the registered preprocessors left to right.
    pub fn preprocess(self) -> Query {
        if self.preprocessors.is_empty() {
            return self;
        }
        let preprocessors = self.preprocessors.clone();
        fold_preprocessors(self, &preprocessors)
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    pub fn filter(mut self, filter: impl Into<Condition>) -> Self {
        self.query.filter = Some(filter.into());
        self
    }

    pub fn sort(mut self, sort: impl Into<Sort>) -> Self {
        self.query.sort.push(sort.into());
        self
    }

    pub fn sorts(mut self, sorts: Vec<Sort>) -> Self {
        self.query.sort = sorts;
        self
    }

    pub fn pagination(mut self, pagination: Pagination) -> Self {
        self.query.pagination = Some(pagination);
        self
    }

    pub fn distinct(mut self, distinct: bool) -> Self {
        self.query.distinct = distinct;
        self
    }

    pub fn select(mut self, select: Select) -> Self {
        self.query.select = Some(select);
        self
    }

    pub fn preprocessor(mut self, preprocessor: Preprocessor<Query>) -> Self {
        self.query.preprocessors.push(preprocessor);
        self
    }

    pub fn customizer<T: std::any::Any + Send + Sync>(mut self, customizer: T) -> Self {
        self.query.customizers.push(Native::new(customizer));
        self
    }

    pub fn build(self) -> Query {
        self.query
    }
}

/// A projection-returning query that may group and filter groups.
///
/// Only backend projection entry points accept this type, so grouping can never
/// reach an entity query.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AdvancedQuery {
    filter: Option<Condition>,
    sort: Vec<Sort>,
    pagination: Option<Pagination>,
    distinct: bool,
    select: Option<Select>,
    group_by: Option<GroupBy>,
    having: Option<Condition>,
    preprocessors: Vec<Preprocessor<AdvancedQuery>>,
    customizers: Vec<Native>,
}

impl AdvancedQuery {
    pub fn builder() -> AdvancedQueryBuilder {
        AdvancedQueryBuilder::default()
    }

    pub fn to_builder(&self) -> AdvancedQueryBuilder {
        AdvancedQueryBuilder {
            query: self.clone(),
        }
    }

    pub fn filter(&self) -> Option<&Condition> {
        self.filter.as_ref()
    }

    pub fn sort(&self) -> &[Sort] {
        &self.sort
    }

    pub fn pagination(&self) -> Option<Pagination> {
        self.pagination
    }

    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    pub fn select(&self) -> Option<&Select> {
        self.select.as_ref()
    }

    pub fn group_by(&self) -> Option<&GroupBy> {
        self.group_by.as_ref()
    }

    pub fn having(&self) -> Option<&Condition> {
        self.having.as_ref()
    }

    pub fn preprocessors(&self) -> &[Preprocessor<AdvancedQuery>] {
        &self.preprocessors
    }

    pub fn customizers(&self) -> &[Native] {
        &self.customizers
    }

    pub fn has_filter(&self) -> bool {
        self.filter.as_ref().is_some_and(|f| !f.is_empty())
    }

    pub fn has_sort(&self) -> bool {
        !self.sort.is_empty()
    }

    pub fn has_pagination(&self) -> bool {
        self.pagination.is_some()
    }

    pub fn has_select(&self) -> bool {
        self.select.as_ref().is_some_and(|s| !s.is_empty())
    }

    pub fn has_group_by(&self) -> bool {
        self.group_by.as_ref().is_some_and(|g| !g.is_empty())
    }

    pub fn has_having(&self) -> bool {
        self.having.as_ref().is_some_and(|h| !h.is_empty())
    }

    pub fn preprocess(self) -> AdvancedQuery {
        if self.preprocessors.is_empty() {
            return self;
        }
        let preprocessors = self.preprocessors.clone();
        fold_preprocessors(self, &preprocessors)
    }
}

/// Lifts an entity query into projection form; preprocessors do not carry over
/// because they are typed over [`Query`].
impl From<Query> for AdvancedQuery {
    fn from(query: Query) -> Self {
        Self {
            filter: query.filter,
            sort: query.sort,
            pagination: query.pagination,
            distinct: query.distinct,
            select: query.select,
            group_by: None,
            having: None,
            preprocessors: Vec::new(),
            customizers: query.customizers,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AdvancedQueryBuilder {
    query: AdvancedQuery,
}

impl AdvancedQueryBuilder {
    pub fn filter(mut self, filter: impl Into<Condition>) -> Self {
        self.query.filter = Some(filter.into());
        self
    }

    pub fn sort(mut self, sort: impl Into<Sort>) -> Self {
        self.query.sort.push(sort.into());
        self
    }

    pub fn sorts(mut self, sorts: Vec<Sort>) -> Self {
        self.query.sort = sorts;
        self
    }

    pub fn pagination(mut self, pagination: Pagination) -> Self {
        self.query.pagination = Some(pagination);
        self
    }

    pub fn distinct(mut self, distinct: bool) -> Self {
        self.query.distinct = distinct;
        self
    }

    pub fn select(mut self, select: Select) -> Self {
        self.query.select = Some(select);
        self
    }

    pub fn group_by(mut self, group_by: GroupBy) -> Self {
        self.query.group_by = Some(group_by);
        self
    }

    pub fn having(mut self, having: impl Into<Condition>) -> Self {
        self.query.having = Some(having.into());
        self
    }

    pub fn preprocessor(mut self, preprocessor: Preprocessor<AdvancedQuery>) -> Self {
        self.query.preprocessors.push(preprocessor);
        self
    }

    pub fn customizer<T: std::any::Any + Send + Sync>(mut self, customizer: T) -> Self {
        self.query.customizers.push(Native::new(customizer));
        self
    }

    pub fn build(self) -> Result<AdvancedQuery, ValidationError> {
        if self.query.has_having() && !self.query.has_group_by() {
            return Err(ValidationError::HavingWithoutGroupBy);
        }
        Ok(self.query)
    }
}
