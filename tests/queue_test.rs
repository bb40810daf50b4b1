//! Queue discipline tests against the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use spiderq::queue::{
    FifoQueue, PAYLOAD_TABLE_KEY, PriorityQueue, QueueBase, QueueKind, QueueOptions, RequestQueue,
    open_queue, resolve_key,
};
use spiderq::fingerprint::FingerprintOptions;
use spiderq::store::{MemoryStore, Store};
use spiderq::{Error, Request, SpiderRef};

fn spider(name: &str) -> Arc<SpiderRef> {
    Arc::new(SpiderRef::new(name))
}

fn open(kind: QueueKind, store: &Arc<MemoryStore>, spider_name: &str) -> Box<dyn RequestQueue> {
    open_queue(
        kind,
        store.clone(),
        spider(spider_name),
        &QueueOptions::default(),
    )
}

fn req(path: &str) -> Request {
    Request::new(format!("https://example.com/{path}"))
}

async fn pop_urls(queue: &dyn RequestQueue, n: usize) -> Vec<String> {
    let mut urls = Vec::new();
    for _ in 0..n {
        let request = queue.pop(Duration::ZERO).await.unwrap().expect("queue ran dry");
        urls.push(request.url);
    }
    urls
}

// ---------------------------------------------------------------------------
// Ordering per discipline
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fifo_pops_in_push_order() {
    let store = Arc::new(MemoryStore::new());
    let queue = open(QueueKind::Fifo, &store, "books");

    for path in ["a", "b", "c"] {
        queue.push(&req(path)).await.unwrap();
    }

    assert_eq!(
        pop_urls(queue.as_ref(), 3).await,
        vec![
            "https://example.com/a",
            "https://example.com/b",
            "https://example.com/c"
        ]
    );
}

#[tokio::test]
async fn lifo_pops_in_reverse_push_order() {
    let store = Arc::new(MemoryStore::new());
    let queue = open(QueueKind::Lifo, &store, "books");

    for path in ["a", "b", "c"] {
        queue.push(&req(path)).await.unwrap();
    }

    assert_eq!(
        pop_urls(queue.as_ref(), 3).await,
        vec![
            "https://example.com/c",
            "https://example.com/b",
            "https://example.com/a"
        ]
    );
}

#[tokio::test]
async fn priority_pops_most_urgent_first() {
    let store = Arc::new(MemoryStore::new());
    let queue = open(QueueKind::Priority, &store, "books");

    queue.push(&req("low").priority(1)).await.unwrap();
    queue.push(&req("high").priority(5)).await.unwrap();
    queue.push(&req("mid").priority(3)).await.unwrap();

    let popped: Vec<i32> = {
        let mut out = Vec::new();
        while let Some(request) = queue.pop(Duration::ZERO).await.unwrap() {
            out.push(request.priority);
        }
        out
    };
    assert_eq!(popped, vec![5, 3, 1]);
}

#[tokio::test]
async fn priority_handles_negative_priorities() {
    let store = Arc::new(MemoryStore::new());
    let queue = open(QueueKind::Priority, &store, "books");

    queue.push(&req("retry").priority(-10)).await.unwrap();
    queue.push(&req("normal")).await.unwrap();

    assert_eq!(
        pop_urls(queue.as_ref(), 2).await,
        vec!["https://example.com/normal", "https://example.com/retry"]
    );
}

// ---------------------------------------------------------------------------
// Length, clear, empty
// ---------------------------------------------------------------------------

#[tokio::test]
async fn length_tracks_pushes_minus_pops() {
    for kind in [QueueKind::Fifo, QueueKind::Lifo, QueueKind::Priority] {
        let store = Arc::new(MemoryStore::new());
        let queue = open(kind, &store, "books");

        for i in 0..5 {
            queue.push(&req(&format!("page/{i}"))).await.unwrap();
        }
        pop_urls(queue.as_ref(), 2).await;

        assert_eq!(queue.len().await.unwrap(), 3, "{kind}");
        assert!(!queue.is_empty().await.unwrap());
    }
}

#[tokio::test]
async fn pop_on_empty_queue_returns_none() {
    for kind in [QueueKind::Fifo, QueueKind::Lifo, QueueKind::Priority] {
        let store = Arc::new(MemoryStore::new());
        let queue = open(kind, &store, "books");

        let popped = queue.pop(Duration::from_secs(5)).await.unwrap();
        assert!(popped.is_none(), "{kind} should be empty");
        assert!(queue.is_empty().await.unwrap());
    }
}

#[tokio::test]
async fn pop_ignores_timeout_and_returns_immediately() {
    let store = Arc::new(MemoryStore::new());
    let queue = open(QueueKind::Fifo, &store, "books");

    let started = std::time::Instant::now();
    let popped = queue.pop(Duration::from_secs(30)).await.unwrap();
    assert!(popped.is_none());
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn clear_empties_only_its_own_queue() {
    let store = Arc::new(MemoryStore::new());
    let books = open(QueueKind::Priority, &store, "books");
    let news = open(QueueKind::Priority, &store, "news");

    books.push(&req("books/1")).await.unwrap();
    books.push(&req("books/2")).await.unwrap();
    news.push(&req("news/1")).await.unwrap();

    books.clear().await.unwrap();

    assert_eq!(books.len().await.unwrap(), 0);
    assert!(books.pop(Duration::ZERO).await.unwrap().is_none());
    assert_eq!(news.len().await.unwrap(), 1);
    let survivor = news.pop(Duration::ZERO).await.unwrap().unwrap();
    assert_eq!(survivor.url, "https://example.com/news/1");
}

#[tokio::test]
async fn clear_leaves_shared_payload_table_alone() {
    let store = Arc::new(MemoryStore::new());
    let queue = open(QueueKind::Priority, &store, "books");

    queue.push(&req("a")).await.unwrap();
    queue.push(&req("b")).await.unwrap();
    queue.clear().await.unwrap();

    assert_eq!(store.hash_len(PAYLOAD_TABLE_KEY).await.unwrap(), 2);
}

#[tokio::test]
async fn clear_is_idempotent() {
    for kind in [QueueKind::Fifo, QueueKind::Lifo, QueueKind::Priority] {
        let store = Arc::new(MemoryStore::new());
        let queue = open(kind, &store, "books");

        queue.clear().await.unwrap();
        queue.clear().await.unwrap();
        assert_eq!(queue.len().await.unwrap(), 0);
    }
}

// ---------------------------------------------------------------------------
// Round trip through the queue
// ---------------------------------------------------------------------------

#[tokio::test]
async fn popped_request_matches_pushed_request() {
    let store = Arc::new(MemoryStore::new());
    let queue = open(QueueKind::Priority, &store, "books");

    let original = Request::new("https://example.com/search?q=rust")
        .method("post")
        .header("Content-Type", "application/json")
        .header("Accept", "text/html")
        .header("Accept", "application/xhtml+xml")
        .body(&b"{\"q\":\"rust\"}"[..])
        .cookie("session", "abc")
        .meta("depth", serde_json::json!(2))
        .priority(7)
        .dont_filter(true)
        .callback("parse_item")
        .errback("on_error")
        .flag("cached");

    queue.push(&original).await.unwrap();
    let popped = queue.pop(Duration::ZERO).await.unwrap().unwrap();

    assert_eq!(popped, original);
}

// ---------------------------------------------------------------------------
// Priority queue payload protocol
// ---------------------------------------------------------------------------

#[tokio::test]
async fn priority_pop_removes_payload_entry() {
    let store = Arc::new(MemoryStore::new());
    let queue = open(QueueKind::Priority, &store, "books");

    queue.push(&req("a")).await.unwrap();
    assert_eq!(store.hash_len(PAYLOAD_TABLE_KEY).await.unwrap(), 1);

    queue.pop(Duration::ZERO).await.unwrap().unwrap();
    assert_eq!(store.hash_len(PAYLOAD_TABLE_KEY).await.unwrap(), 0);
}

#[tokio::test]
async fn duplicate_fingerprint_keeps_last_payload() {
    let store = Arc::new(MemoryStore::new());
    let queue = open(QueueKind::Priority, &store, "books");

    // Query order differs, so both canonicalize to the same fingerprint.
    queue
        .push(&Request::new("https://example.com/p?a=1&b=2").priority(1))
        .await
        .unwrap();
    queue
        .push(&Request::new("https://example.com/p?b=2&a=1").priority(9))
        .await
        .unwrap();

    assert_eq!(queue.len().await.unwrap(), 1);
    let popped = queue.pop(Duration::ZERO).await.unwrap().unwrap();
    assert_eq!(popped.url, "https://example.com/p?b=2&a=1");
    assert_eq!(popped.priority, 9);
    assert!(queue.pop(Duration::ZERO).await.unwrap().is_none());
}

#[tokio::test]
async fn shared_fingerprint_across_spiders_reports_missing_payload() {
    let store = Arc::new(MemoryStore::new());
    let books = open(QueueKind::Priority, &store, "books");
    let news = open(QueueKind::Priority, &store, "news");

    books.push(&req("shared")).await.unwrap();
    news.push(&req("shared")).await.unwrap();

    books.pop(Duration::ZERO).await.unwrap().unwrap();
    let err = news.pop(Duration::ZERO).await.unwrap_err();

    assert!(matches!(err, Error::MissingPayload { .. }), "got {err:?}");
    assert_eq!(news.len().await.unwrap(), 0);
}

#[tokio::test]
async fn custom_payload_table_is_used() {
    let store = Arc::new(MemoryStore::new());
    let options = QueueOptions {
        payload_table: "crawler:bodies".to_string(),
        ..QueueOptions::default()
    };
    let queue = open_queue(QueueKind::Priority, store.clone(), spider("books"), &options);

    queue.push(&req("a")).await.unwrap();

    assert_eq!(store.hash_len("crawler:bodies").await.unwrap(), 1);
    assert_eq!(store.hash_len(PAYLOAD_TABLE_KEY).await.unwrap(), 0);
}

#[tokio::test]
async fn fingerprint_headers_keep_header_variants_apart() {
    let english = req("page").header("Accept-Language", "en");
    let german = req("page").header("Accept-Language", "de");

    let store = Arc::new(MemoryStore::new());
    let plain = open(QueueKind::Priority, &store, "plain");
    plain.push(&english).await.unwrap();
    plain.push(&german).await.unwrap();
    assert_eq!(plain.len().await.unwrap(), 1);

    let store = Arc::new(MemoryStore::new());
    let options = QueueOptions {
        fingerprint: FingerprintOptions {
            include_headers: vec!["accept-language".to_string()],
            ..FingerprintOptions::default()
        },
        ..QueueOptions::default()
    };
    let keyed = open_queue(QueueKind::Priority, store.clone(), spider("keyed"), &options);
    keyed.push(&english).await.unwrap();
    keyed.push(&german).await.unwrap();
    assert_eq!(keyed.len().await.unwrap(), 2);
    assert_eq!(store.hash_len(PAYLOAD_TABLE_KEY).await.unwrap(), 2);

    let mut languages = Vec::new();
    while let Some(request) = keyed.pop(Duration::ZERO).await.unwrap() {
        languages.extend(request.headers["Accept-Language"].clone());
    }
    languages.sort();
    assert_eq!(languages, vec!["de", "en"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_pops_deliver_single_item_once() {
    let store = Arc::new(MemoryStore::new());
    let queue: Arc<dyn RequestQueue> = Arc::from(open(QueueKind::Priority, &store, "books"));
    queue.push(&req("only")).await.unwrap();

    let first = tokio::spawn({
        let queue = Arc::clone(&queue);
        async move { queue.pop(Duration::ZERO).await }
    });
    let second = tokio::spawn({
        let queue = Arc::clone(&queue);
        async move { queue.pop(Duration::ZERO).await }
    });

    let results = [first.await.unwrap().unwrap(), second.await.unwrap().unwrap()];
    let delivered = results.iter().filter(|r| r.is_some()).count();
    assert_eq!(delivered, 1);
    assert_eq!(store.hash_len(PAYLOAD_TABLE_KEY).await.unwrap(), 0);
}

// ---------------------------------------------------------------------------
// Failure surfaces
// ---------------------------------------------------------------------------

#[tokio::test]
async fn corrupt_payload_is_a_decode_error_and_is_consumed() {
    let store = Arc::new(MemoryStore::new());
    let queue = open(QueueKind::Fifo, &store, "books");

    store
        .list_push_front(queue.key(), b"not json at all")
        .await
        .unwrap();

    let err = queue.pop(Duration::ZERO).await.unwrap_err();
    assert!(matches!(err, Error::Decode { codec: "json", .. }), "got {err:?}");
    assert_eq!(queue.len().await.unwrap(), 0);
}

#[tokio::test]
async fn unknown_callback_is_rejected_before_any_write() {
    let store = Arc::new(MemoryStore::new());
    let strict = Arc::new(SpiderRef::new("books").with_callbacks(["parse"]));
    let base = QueueBase::new(store.clone(), strict, "%(spider)s:requests", None);
    let queue = PriorityQueue::new(base, PAYLOAD_TABLE_KEY);

    let err = queue
        .push(&req("a").callback("parse_detail"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::UnknownCallback { .. }), "got {err:?}");
    assert_eq!(queue.len().await.unwrap(), 0);
    assert_eq!(store.hash_len(PAYLOAD_TABLE_KEY).await.unwrap(), 0);
}

#[tokio::test]
async fn relative_url_is_rejected() {
    let store = Arc::new(MemoryStore::new());
    let queue = open(QueueKind::Fifo, &store, "books");

    let err = queue.push(&Request::new("/no/scheme")).await.unwrap_err();
    assert!(matches!(err, Error::InvalidRequest(_)), "got {err:?}");
}

#[tokio::test]
async fn list_queue_on_sorted_set_key_is_a_store_error() {
    let store = Arc::new(MemoryStore::new());
    let priority = open(QueueKind::Priority, &store, "books");
    let fifo = open(QueueKind::Fifo, &store, "books");

    priority.push(&req("a")).await.unwrap();

    let err = fifo.push(&req("b")).await.unwrap_err();
    assert!(matches!(err, Error::Store(_)), "got {err:?}");
}

// ---------------------------------------------------------------------------
// Keys and kinds
// ---------------------------------------------------------------------------

#[test]
fn key_template_substitutes_spider_name() {
    assert_eq!(resolve_key("%(spider)s:requests", "books"), "books:requests");
    assert_eq!(resolve_key("crawl:%(spider)s:q", "news"), "crawl:news:q");
    assert_eq!(resolve_key("static", "books"), "static");
}

#[test]
fn queue_reports_resolved_key_and_kind() {
    let store = Arc::new(MemoryStore::new());
    let base = QueueBase::new(store, spider("books"), "bot:%(spider)s:fifo", None);
    let queue = FifoQueue::new(base);

    assert_eq!(queue.key(), "bot:books:fifo");
    assert_eq!(queue.kind(), QueueKind::Fifo);
}

#[test]
fn queue_kind_accepts_legacy_names() {
    assert_eq!("fifo".parse::<QueueKind>().unwrap(), QueueKind::Fifo);
    assert_eq!("SpiderQueue".parse::<QueueKind>().unwrap(), QueueKind::Fifo);
    assert_eq!("SpiderStack".parse::<QueueKind>().unwrap(), QueueKind::Lifo);
    assert_eq!("LifoQueue".parse::<QueueKind>().unwrap(), QueueKind::Lifo);
    assert_eq!(
        "crawler.queue.SpiderPriorityQueue"
            .parse::<QueueKind>()
            .unwrap(),
        QueueKind::Priority
    );
    assert_eq!(" Priority ".parse::<QueueKind>().unwrap(), QueueKind::Priority);
    assert!(matches!(
        "random".parse::<QueueKind>(),
        Err(Error::Config(_))
    ));
}
