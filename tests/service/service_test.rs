#[path = "../common/mod.rs"]
mod common;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common::*;
use serde_json::{json, Value};
use vista::backend::{
    BackendError, BackendResult, IndexResolver, ResolvedIndices, SearchBackend, SearchRequest,
    SqlBackend, SqlFetch,
};
use vista::condition::{BasicConditionCompiler, FilterCond};
use vista::config::{PoolSettings, Settings};
use vista::error::{ErrorClass, ViewError};
use vista::model::{NodeConfig, QueryType, SearchAfterParams, SortDirection, SortParam, ViewQuery};
use vista::service::{Backends, ViewQueryService};

#[derive(Default)]
struct FakeResolver {
    indices: Vec<String>,
    calls: Mutex<Vec<Vec<String>>>,
}

#[async_trait]
impl IndexResolver for FakeResolver {
    async fn resolve(&self, base_types: &[String], _start: i64, _end: i64) -> BackendResult<ResolvedIndices> {
        self.calls.lock().unwrap().push(base_types.to_vec());
        Ok(ResolvedIndices {
            indices: self.indices.clone(),
            status: 200,
        })
    }
}

#[derive(Default)]
struct FakeSearch {
    response: Vec<u8>,
    total: u64,
    fail_with: Option<BackendError>,
    searches: Mutex<Vec<SearchRequest>>,
    pit_bodies: Mutex<Vec<Value>>,
    scrolls: Mutex<Vec<(String, String)>>,
    pits_opened: AtomicUsize,
    counts: AtomicUsize,
}

#[async_trait]
impl SearchBackend for FakeSearch {
    async fn search(&self, request: SearchRequest) -> BackendResult<Vec<u8>> {
        if let Some(err) = &self.fail_with {
            return Err(err.clone());
        }
        self.searches.lock().unwrap().push(request);
        Ok(self.response.clone())
    }

    async fn scroll(&self, scroll_id: &str, keep_alive: &str) -> BackendResult<Vec<u8>> {
        self.scrolls
            .lock()
            .unwrap()
            .push((scroll_id.to_string(), keep_alive.to_string()));
        Ok(self.response.clone())
    }

    async fn search_with_pit(&self, body: Vec<u8>) -> BackendResult<Vec<u8>> {
        self.pit_bodies
            .lock()
            .unwrap()
            .push(serde_json::from_slice(&body).unwrap());
        Ok(self.response.clone())
    }

    async fn create_pit(&self, _indices: &[String], _keep_alive: &str) -> BackendResult<String> {
        self.pits_opened.fetch_add(1, Ordering::SeqCst);
        Ok("pit-1".to_string())
    }

    async fn count(&self, _indices: &[String], _body: Vec<u8>) -> BackendResult<u64> {
        self.counts.fetch_add(1, Ordering::SeqCst);
        Ok(self.total)
    }
}

#[derive(Default)]
struct FakeSql {
    responses: Mutex<VecDeque<Vec<u8>>>,
    fetches: Mutex<Vec<SqlFetch>>,
}

impl FakeSql {
    fn with_responses(responses: Vec<Value>) -> Self {
        Self {
            responses: Mutex::new(
                responses
                    .into_iter()
                    .map(|v| serde_json::to_vec(&v).unwrap())
                    .collect(),
            ),
            fetches: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl SqlBackend for FakeSql {
    async fn fetch(&self, request: SqlFetch) -> BackendResult<Vec<u8>> {
        self.fetches.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| BackendError::new("no response queued"))
    }
}

struct Harness {
    resolver: Arc<FakeResolver>,
    search: Arc<FakeSearch>,
    sql: Arc<FakeSql>,
    service: ViewQueryService,
}

fn harness(resolver: FakeResolver, search: FakeSearch, sql: FakeSql) -> Harness {
    let resolver = Arc::new(resolver);
    let search = Arc::new(search);
    let sql = Arc::new(sql);
    let settings = Settings {
        pool: PoolSettings { size: 2 },
        ..Default::default()
    };
    let service = ViewQueryService::from_settings(
        &settings,
        Arc::new(BasicConditionCompiler),
        Backends {
            resolver: resolver.clone(),
            search: search.clone(),
            sql: sql.clone(),
        },
    )
    .unwrap();
    Harness {
        resolver,
        search,
        sql,
        service,
    }
}

fn hits_body() -> Vec<u8> {
    serde_json::to_vec(&json!({
        "pit_id": "pit-2",
        "hits": {"hits": [
            {"_index": "ds-logs-2024.01.01", "_id": "a", "_score": 1.0,
             "_source": {"host": "web-1", "status": 500}, "sort": [1704067200000_i64, "a"]}
        ]}
    }))
    .unwrap()
}

fn logs_search() -> FakeSearch {
    FakeSearch {
        response: hits_body(),
        total: 42,
        ..Default::default()
    }
}

fn logs_resolver() -> FakeResolver {
    FakeResolver {
        indices: vec!["ds-logs-2024.01.01".to_string()],
        ..Default::default()
    }
}

#[tokio::test]
async fn test_index_view_searches_resolved_indices() {
    let h = harness(logs_resolver(), logs_search(), FakeSql::default());
    let query = ViewQuery {
        start: 1_704_067_200_000,
        end: 1_704_153_600_000,
        need_total: true,
        ..Default::default()
    };

    let page = h.service.query(&logs_view(), &query).await.unwrap();

    assert_eq!(h.resolver.calls.lock().unwrap().as_slice(), &[vec!["logs".to_string()]]);
    let searches = h.search.searches.lock().unwrap();
    assert_eq!(searches.len(), 1);
    assert_eq!(searches[0].indices, vec!["ds-logs-2024.01.01"]);
    assert_eq!(searches[0].scroll, None);
    let body: Value = serde_json::from_slice(&searches[0].body).unwrap();
    assert_eq!(body["size"], json!(10));

    assert_eq!(h.search.counts.load(Ordering::SeqCst), 1);
    assert_eq!(page.total_count, Some(42));
    assert_eq!(page.entries.len(), 1);
    assert_eq!(page.entries[0]["host"], json!("web-1"));
}

#[tokio::test]
async fn test_no_indices_short_circuits() {
    let h = harness(FakeResolver::default(), logs_search(), FakeSql::default());
    let query = ViewQuery {
        need_total: true,
        ..Default::default()
    };

    let page = h.service.query(&logs_view(), &query).await.unwrap();

    assert!(page.entries.is_empty());
    assert_eq!(page.total_count, Some(0));
    assert!(h.search.searches.lock().unwrap().is_empty());
    assert_eq!(h.search.counts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_first_pit_page_opens_point_in_time() {
    let h = harness(logs_resolver(), logs_search(), FakeSql::default());
    let query = ViewQuery {
        use_search_after: true,
        need_total: true,
        search_after: Some(SearchAfterParams {
            pit_keep_alive: Some("1m".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    };

    let page = h.service.query(&logs_view(), &query).await.unwrap();

    assert_eq!(h.search.pits_opened.load(Ordering::SeqCst), 1);
    let bodies = h.search.pit_bodies.lock().unwrap();
    assert_eq!(bodies[0]["pit"], json!({"id": "pit-1", "keep_alive": "1m"}));
    assert!(h.search.searches.lock().unwrap().is_empty());
    assert_eq!(h.search.counts.load(Ordering::SeqCst), 1);

    assert_eq!(page.pit_id.as_deref(), Some("pit-2"));
    assert_eq!(page.search_after, vec![json!(1_704_067_200_000_i64), json!("a")]);
}

#[tokio::test]
async fn test_binary_sort_rejected_before_any_backend_call() {
    let h = harness(logs_resolver(), logs_search(), FakeSql::default());
    let query = ViewQuery {
        use_search_after: true,
        sort: vec![SortParam::new("payload", SortDirection::Asc)],
        search_after: Some(SearchAfterParams {
            pit_keep_alive: Some("1m".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    };

    let err = h.service.query(&logs_view(), &query).await.unwrap_err();

    assert!(matches!(err, ViewError::BinaryFieldSort(f) if f == "payload"));
    assert!(h.resolver.calls.lock().unwrap().is_empty());
    assert_eq!(h.search.pits_opened.load(Ordering::SeqCst), 0);
    assert!(h.search.searches.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_pit_continuation_skips_count() {
    let h = harness(logs_resolver(), logs_search(), FakeSql::default());
    let query = ViewQuery {
        use_search_after: true,
        need_total: true,
        search_after: Some(SearchAfterParams {
            search_after: vec![json!(1_704_067_200_000_i64), json!("a")],
            pit_id: Some("pit-2".to_string()),
            pit_keep_alive: Some("1m".to_string()),
        }),
        ..Default::default()
    };

    h.service.query(&logs_view(), &query).await.unwrap();

    assert_eq!(h.search.pits_opened.load(Ordering::SeqCst), 0);
    assert_eq!(h.search.counts.load(Ordering::SeqCst), 0);
    let bodies = h.search.pit_bodies.lock().unwrap();
    assert_eq!(bodies[0]["search_after"], json!([1_704_067_200_000_i64, "a"]));
}

#[tokio::test]
async fn test_scroll_continuation() {
    let h = harness(logs_resolver(), logs_search(), FakeSql::default());
    let query = ViewQuery {
        scroll: Some("2m".to_string()),
        scroll_id: Some("scroll-7".to_string()),
        ..Default::default()
    };

    let page = h.service.query(&logs_view(), &query).await.unwrap();

    assert_eq!(
        h.search.scrolls.lock().unwrap().as_slice(),
        &[("scroll-7".to_string(), "2m".to_string())]
    );
    assert!(h.resolver.calls.lock().unwrap().is_empty());
    assert_eq!(page.entries.len(), 1);
}

#[tokio::test]
async fn test_raw_dsl_view() {
    let envelope = json!({"data": [{
        "hits": {"total": {"value": 7}, "hits": [
            {"_index": "logs", "_id": "x", "_source": {"host": "web-3", "status": 200}}
        ]}
    }]});
    let search = FakeSearch {
        response: serde_json::to_vec(&envelope).unwrap(),
        ..Default::default()
    };
    let h = harness(FakeResolver::default(), search, FakeSql::default());
    let mut view = logs_view();
    view.query_type = QueryType::Dsl;
    let query = ViewQuery {
        need_total: true,
        ..Default::default()
    };

    let page = h.service.query(&view, &query).await.unwrap();

    let searches = h.search.searches.lock().unwrap();
    assert_eq!(searches[0].indices, vec!["logs"]);
    let body: Value = serde_json::from_slice(&searches[0].body).unwrap();
    assert_eq!(body["track_total_hits"], json!(true));
    assert_eq!(page.total_count, Some(7));
    assert!(h.resolver.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_sql_view_counts_then_fetches() {
    let sql = FakeSql::with_responses(vec![
        json!({"columns": [{"name": "_col0", "type": "bigint"}], "entries": [[2]]}),
        json!({
            "columns": [{"name": "id", "type": "bigint"}, {"name": "amount", "type": "double"}],
            "entries": [[1, 10.0], [2, 20.0]]
        }),
    ]);
    let h = harness(FakeResolver::default(), FakeSearch::default(), sql);
    let query = ViewQuery {
        need_total: true,
        limit: 2,
        ..Default::default()
    };

    let page = h.service.query(&orders_view(), &query).await.unwrap();

    let fetches = h.sql.fetches.lock().unwrap();
    assert_eq!(fetches.len(), 2);
    assert_eq!(fetches[0].sql, "SELECT count(*) FROM (SELECT * FROM sales.orders) AS t");
    assert_eq!(fetches[1].sql, "SELECT * FROM sales.orders LIMIT 2");
    assert_eq!(fetches[1].timeout, std::time::Duration::from_secs(60));
    assert_eq!(page.total_count, Some(2));
    assert_eq!(page.entries.len(), 2);
}

#[tokio::test]
async fn test_sql_zero_count_skips_fetch() {
    let sql = FakeSql::with_responses(vec![
        json!({"columns": [{"name": "_col0", "type": "bigint"}], "entries": [[0]]}),
    ]);
    let h = harness(FakeResolver::default(), FakeSearch::default(), sql);
    let query = ViewQuery {
        need_total: true,
        ..Default::default()
    };

    let page = h.service.query(&orders_view(), &query).await.unwrap();

    assert_eq!(h.sql.fetches.lock().unwrap().len(), 1);
    assert_eq!(page.total_count, Some(0));
    assert!(page.entries.is_empty());
}

#[tokio::test]
async fn test_unknown_filter_field() {
    let h = harness(logs_resolver(), logs_search(), FakeSql::default());
    let mut query = ViewQuery {
        filters: Some(FilterCond::leaf("latency", ">", 100)),
        ..Default::default()
    };

    let err = h.service.query(&logs_view(), &query).await.unwrap_err();
    assert!(matches!(&err, ViewError::FilterFieldNotInView(f) if f == "latency"));

    query.allow_non_exist_field = true;
    let page = h.service.query(&logs_view(), &query).await.unwrap();
    assert!(page.entries.is_empty());
    assert!(h.resolver.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_union_arity_failure_reaches_no_backend() {
    let h = harness(FakeResolver::default(), FakeSearch::default(), FakeSql::default());
    let mut view = ledger_view();
    if let NodeConfig::Union(cfg) = &mut view.data_scope[2].config {
        cfg.union_fields.truncate(1);
    }

    let err = h.service.query(&view, &ViewQuery::default()).await.unwrap_err();

    assert!(matches!(err, ViewError::Validation { .. }));
    assert!(h.sql.fetches.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_view_is_not_modified() {
    let sql = FakeSql::with_responses(vec![json!({
        "columns": [{"name": "entry_id", "type": "bigint"}],
        "entries": [[1]]
    })]);
    let h = harness(FakeResolver::default(), FakeSearch::default(), sql);
    let view = ledger_view();

    h.service.query(&view, &ViewQuery::default()).await.unwrap();

    assert_eq!(view, ledger_view());
}

#[tokio::test]
async fn test_backend_status_is_classified() {
    let search = FakeSearch {
        fail_with: Some(BackendError::with_status(404, "no such index [ds-logs-2024.01.01]")),
        ..Default::default()
    };
    let h = harness(logs_resolver(), search, FakeSql::default());

    let err = h.service.query(&logs_view(), &ViewQuery::default()).await.unwrap_err();

    assert_eq!(err.class(), ErrorClass::NotFound);
    assert!(err.to_string().contains("no such index"));
}
