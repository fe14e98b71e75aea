//! The view query service: one request from view definition to page.
//!
//! ```text
//! query(view, q)
//!   ├─ clone view, validate, check filter and sort fields, resolve pagination
//!   ├─ IndexBase ─ resolve indices ─ [create PIT] ─ build DSL ─ search ∥ count
//!   ├─ DSL ─────── static routes ─ build DSL ─ search
//!   └─ SQL ─────── compose SQL ─ [count] ─ fetch
//!                                   │
//!                normalize rows on the shared pool (spawn_blocking)
//! ```

use std::sync::Arc;

use tracing::{debug, info};

use crate::backend::{IndexResolver, SearchBackend, SearchRequest, SqlBackend, SqlFetch};
use crate::condition::{
    merge_row_column_rules, referenced_fields, validate_filter, ConditionCompiler, FilterCond,
    ALL_FIELDS,
};
use crate::config::{QuerySettings, Settings};
use crate::dsl::{build_dsl, DslCompilation};
use crate::error::{ViewError, ViewResult};
use crate::model::{DataView, FieldSet, Pagination, QueryType, ViewQuery};
use crate::normalize::{
    normalize_search, normalize_sql, parse_dsl_response, parse_search_response, parse_sql_count,
    parse_sql_response, RowPool, SearchResponse, ViewPage,
};
use crate::routing::{resolve_view_indices, static_routes};
use crate::sql::compose_request_sql;
use crate::validation::validate_view;

/// External systems a service talks to.
#[derive(Clone)]
pub struct Backends {
    pub resolver: Arc<dyn IndexResolver>,
    pub search: Arc<dyn SearchBackend>,
    pub sql: Arc<dyn SqlBackend>,
}

/// Answers view queries against the configured backends.
pub struct ViewQueryService {
    settings: QuerySettings,
    compiler: Arc<dyn ConditionCompiler>,
    backends: Backends,
    pool: Arc<RowPool>,
}

impl ViewQueryService {
    pub fn new(
        settings: QuerySettings,
        compiler: Arc<dyn ConditionCompiler>,
        backends: Backends,
        pool: Arc<RowPool>,
    ) -> Self {
        Self {
            settings,
            compiler,
            backends,
            pool,
        }
    }

    /// Build a service from loaded settings, sizing the row pool from `[pool]`.
    pub fn from_settings(
        settings: &Settings,
        compiler: Arc<dyn ConditionCompiler>,
        backends: Backends,
    ) -> ViewResult<Self> {
        let pool = RowPool::from_settings(&settings.pool)?;
        info!(threads = pool.threads(), "row pool ready");
        Ok(Self::new(
            settings.query.clone(),
            compiler,
            backends,
            Arc::new(pool),
        ))
    }

    pub fn settings(&self) -> &QuerySettings {
        &self.settings
    }

    /// Run `query` against `view`. The view itself is never modified; all
    /// request-scoped changes happen on a copy.
    pub async fn query(&self, view: &DataView, query: &ViewQuery) -> ViewResult<ViewPage> {
        let mut view = view.clone();
        validate_view(&mut view, &self.settings)?;

        if let Some(filter) = query.filters.as_ref().filter(|f| !f.is_empty()) {
            if let Some(missing) = missing_filter_field(filter, &view.fields) {
                if query.allow_non_exist_field {
                    debug!(view = %view.id, field = %missing, "filter names an unknown field, returning empty page");
                    return Ok(empty_page(&view, query));
                }
                return Err(ViewError::FilterFieldNotInView(missing));
            }
            validate_filter(filter, &view.fields, self.settings.max_sub_conditions)?;
        }

        check_sort_fields(query, &view.fields)?;

        let pagination = query.pagination(view.query_type)?;
        match view.query_type {
            QueryType::IndexBase => self.query_index_base(view, query, pagination).await,
            QueryType::Dsl => self.query_dsl(view, query, pagination).await,
            QueryType::Sql => self.query_sql(view, query, pagination).await,
        }
    }

    async fn query_index_base(
        &self,
        view: DataView,
        query: &ViewQuery,
        mut pagination: Pagination,
    ) -> ViewResult<ViewPage> {
        if let Pagination::Scroll {
            scroll_id: Some(scroll_id),
            keep_alive,
        } = &pagination
        {
            let keep_alive = keep_alive
                .clone()
                .unwrap_or_else(|| self.settings.default_pit_keep_alive.clone());
            let body = self.backends.search.scroll(scroll_id, &keep_alive).await?;
            let response = parse_search_response(&body)?;
            let fields = self.visible_fields(&view, query)?;
            return self.normalize_hits(view, fields, query, response, None).await;
        }

        let routes =
            resolve_view_indices(self.backends.resolver.as_ref(), &view, query.start, query.end)
                .await?;
        if routes.is_empty() {
            info!(view = %view.id, "no indices in the requested window");
            return Ok(empty_page(&view, query));
        }

        let mut continuing = false;
        if let Pagination::SearchAfter {
            pit_id,
            pit_keep_alive,
            ..
        } = &mut pagination
        {
            continuing = pit_id.is_some();
            if !continuing {
                if let Some(keep_alive) = pit_keep_alive.as_deref() {
                    let id = self
                        .backends
                        .search
                        .create_pit(&routes.indices, keep_alive)
                        .await?;
                    debug!(view = %view.id, pit = %id, "opened point-in-time");
                    *pit_id = Some(id);
                }
            }
        }

        let compiled = build_dsl(
            &view,
            query,
            &pagination,
            &routes.by_node,
            self.compiler.as_ref(),
            &self.settings,
        )?;
        let body = serialize(&compiled)?;
        info!(view = %view.id, dsl = %String::from_utf8_lossy(&body), "generated search DSL");

        let with_pit = matches!(&pagination, Pagination::SearchAfter { pit_id: Some(_), .. });
        let scroll = match &pagination {
            Pagination::Scroll { keep_alive, .. } => keep_alive.clone(),
            _ => None,
        };
        let search = async {
            let bytes = if with_pit {
                self.backends.search.search_with_pit(body).await?
            } else {
                self.backends
                    .search
                    .search(SearchRequest {
                        indices: routes.indices.clone(),
                        body,
                        scroll,
                    })
                    .await?
            };
            Ok::<_, ViewError>(bytes)
        };
        let count = async {
            if !query.need_total || continuing {
                return Ok(None);
            }
            let count_body = serde_json::to_vec(&compiled.query.count_body())
                .map_err(|e| ViewError::compile(format!("failed to serialize count request: {}", e)))?;
            let total = self.backends.search.count(&routes.indices, count_body).await?;
            Ok::<_, ViewError>(Some(total))
        };
        let (bytes, total) = futures::try_join!(search, count)?;

        let response = parse_search_response(&bytes)?;
        self.normalize_hits(view, compiled.fields, query, response, total)
            .await
    }

    async fn query_dsl(
        &self,
        view: DataView,
        query: &ViewQuery,
        pagination: Pagination,
    ) -> ViewResult<ViewPage> {
        let routes = static_routes(&view);
        if routes.is_empty() {
            return Ok(empty_page(&view, query));
        }

        let compiled = build_dsl(
            &view,
            query,
            &pagination,
            &routes.by_node,
            self.compiler.as_ref(),
            &self.settings,
        )?;
        let body = serialize(&compiled)?;
        info!(view = %view.id, dsl = %String::from_utf8_lossy(&body), "generated search DSL");

        let scroll = match &pagination {
            Pagination::Scroll { keep_alive, .. } => keep_alive.clone(),
            _ => None,
        };
        let bytes = self
            .backends
            .search
            .search(SearchRequest {
                indices: routes.indices,
                body,
                scroll,
            })
            .await?;
        let response = parse_dsl_response(&bytes)?;
        let total = response.total();
        self.normalize_hits(view, compiled.fields, query, response, total)
            .await
    }

    async fn query_sql(
        &self,
        mut view: DataView,
        query: &ViewQuery,
        pagination: Pagination,
    ) -> ViewResult<ViewPage> {
        let request = compose_request_sql(
            &mut view,
            query,
            &pagination,
            self.compiler.as_ref(),
            &self.settings,
        )?;
        info!(view = %view.id, sql = %request.sql, "generated SQL");
        let timeout = self.settings.sql_timeout()?;

        let mut total = None;
        if let Some(count_sql) = &request.count_sql {
            let body = self
                .backends
                .sql
                .fetch(SqlFetch {
                    sql: count_sql.clone(),
                    next_uri: None,
                    limit: 1,
                    timeout,
                })
                .await?;
            let count = parse_sql_count(&body)?;
            if count == 0 {
                return Ok(empty_page(&view, query));
            }
            total = Some(count);
        }

        let body = self
            .backends
            .sql
            .fetch(SqlFetch {
                sql: request.sql.clone(),
                next_uri: request.next_uri.clone(),
                limit: request.limit,
                timeout,
            })
            .await?;
        let page = parse_sql_response(&body)?;
        debug!(view = %view.id, rows = page.rows.len(), reported = ?page.total_count, "SQL page fetched");

        let pool = Arc::clone(&self.pool);
        let query = query.clone();
        let fields = request.fields;
        tokio::task::spawn_blocking(move || {
            normalize_sql(&pool, &mut view, &fields, &query, page, total)
        })
        .await
        .map_err(|e| ViewError::Pool(e.to_string()))?
    }

    async fn normalize_hits(
        &self,
        view: DataView,
        fields: FieldSet,
        query: &ViewQuery,
        response: SearchResponse,
        total: Option<u64>,
    ) -> ViewResult<ViewPage> {
        let pool = Arc::clone(&self.pool);
        let query = query.clone();
        tokio::task::spawn_blocking(move || {
            normalize_search(&pool, &view, &fields, &query, response, total)
        })
        .await
        .map_err(|e| ViewError::Pool(e.to_string()))?
    }

    /// Fields left visible by the caller's column rules.
    fn visible_fields(&self, view: &DataView, query: &ViewQuery) -> ViewResult<FieldSet> {
        if query.row_column_rules.is_empty() {
            return Ok(view.fields.clone());
        }
        let merged = merge_row_column_rules(
            &query.row_column_rules,
            &view.fields,
            self.settings.max_sub_conditions,
        )?;
        Ok(merged.fields)
    }
}

fn serialize(compiled: &DslCompilation) -> ViewResult<Vec<u8>> {
    compiled
        .query
        .to_bytes()
        .map_err(|e| ViewError::compile(format!("failed to serialize search request: {}", e)))
}

fn empty_page(view: &DataView, query: &ViewQuery) -> ViewPage {
    ViewPage {
        view: query.include_view.then(|| view.clone()),
        ..ViewPage::empty(query.need_total)
    }
}

/// Binary fields cannot be sorted on; reject them before any backend is touched.
fn check_sort_fields(query: &ViewQuery, fields: &FieldSet) -> ViewResult<()> {
    match query
        .sort
        .iter()
        .find(|p| fields.get(&p.field).is_some_and(|f| f.data_type.is_binary()))
    {
        Some(param) => Err(ViewError::BinaryFieldSort(param.field.clone())),
        None => Ok(()),
    }
}

/// The first field the filter names that the view does not expose.
fn missing_filter_field(filter: &FilterCond, fields: &FieldSet) -> Option<String> {
    referenced_fields(filter)
        .into_iter()
        .find(|name| *name != ALL_FIELDS && !fields.contains(name))
        .map(str::to_string)
}
