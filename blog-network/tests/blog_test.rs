use blog_network::{
    Blog, BlogConfig, BlogEvent, BlogState, LoaderEvent, MatchError, NetworkError, Post, PostFields,
    PostRef, Query, RawPost, SelectOptions, StaticLoader, ValidationError, Verdict,
};
use chrono::{DateTime, NaiveDate, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use tracing::info;

static INIT: Once = Once::new();

fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .try_init()
            .ok();
    });
}

fn day(date: &str) -> DateTime<Utc> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        .and_utc()
}

fn post(id: i64, title: &str, date: &str) -> RawPost {
    RawPost::new(id, title, date)
}

fn titles(posts: &[&Post]) -> Vec<String> {
    posts.iter().map(|post| post.title().to_string()).collect()
}

fn ids(posts: &[&Post]) -> Vec<String> {
    posts.iter().map(|post| post.id().to_string()).collect()
}

fn is_sorted(posts: &[&Post]) -> bool {
    posts.windows(2).all(|pair| pair[0].date() >= pair[1].date())
}

fn four_posts() -> Blog {
    Blog::from_records(vec![
        post(1, "foobar", "2012-10-01").with_field("category", "foo"),
        post(2, "foo", "2012-10-02").with_field("category", "foo"),
        post(3, "bar", "2012-10-03").with_field("category", "bar"),
        post(4, "baz", "2012-10-04").with_field("category", "bar"),
    ])
}

fn category_match(post: &dyn PostFields, query: &Query) -> Result<Verdict, MatchError> {
    Ok((post.field("category") == Some(query)).into())
}

#[test]
fn test_blog_parses_post_dates() {
    init_tracing();

    let blog = Blog::from_records(vec![post(1, "foo", "2012-10-01")]);
    assert_eq!(blog.state(), BlogState::Ready, "Blog should be ready after a valid batch");

    let foo = blog.post("foo").expect("post should be reachable by slug");
    assert_eq!(foo.date(), day("2012-10-01"));
    info!("Parsed date {} for {}", foo.date(), foo);
}

#[test]
fn test_blog_gives_posts_a_default_title() {
    init_tracing();

    let blog = Blog::from_records(vec![RawPost {
        id: Some(json!(1)),
        date: Some(json!("2012-10-01")),
        ..Default::default()
    }]);
    let first = blog.first().unwrap();
    assert_eq!(first.title(), "Untitled");
    assert_eq!(first.slug(), "untitled");
}

#[test]
fn test_blog_uses_configured_default_title() {
    init_tracing();

    let config = BlogConfig {
        default_title: "No Title Yet".to_string(),
        ..BlogConfig::default()
    };
    let mut blog = Blog::with_config(config);
    blog.handle(LoaderEvent::Loaded(vec![RawPost {
        id: Some(json!("a")),
        date: Some(json!("2012-10-01")),
        ..Default::default()
    }]));
    assert_eq!(blog.post("no-title-yet").map(Post::title), Some("No Title Yet"));
}

#[test]
fn test_blog_rejects_invalid_initial_batches() {
    init_tracing();

    let cases = vec![
        (
            "duplicate id",
            vec![post(1, "foo", "2012-10-01"), post(1, "foo", "2012-10-01")],
            ValidationError::DuplicateId { id: "1".to_string() },
        ),
        (
            "missing date",
            vec![RawPost {
                id: Some(json!(1)),
                title: Some("foo".to_string()),
                ..Default::default()
            }],
            ValidationError::MissingDate { id: "1".to_string() },
        ),
        (
            "invalid date",
            vec![post(1, "foo", "foo")],
            ValidationError::InvalidDate {
                id: "1".to_string(),
                value: "\"foo\"".to_string(),
            },
        ),
        (
            "missing id",
            vec![RawPost {
                title: Some("foo".to_string()),
                date: Some(json!("2012-10-01")),
                ..Default::default()
            }],
            ValidationError::MissingId,
        ),
    ];

    for (name, records, expected) in cases {
        info!("Checking batch with {}", name);
        let mut blog = Blog::from_records(records);
        assert_eq!(blog.state(), BlogState::Failed, "{} should fail the blog", name);
        assert!(blog.is_empty(), "{} should ingest nothing", name);
        assert_eq!(
            blog.drain_events(),
            vec![BlogEvent::Error(NetworkError::Validation(expected))],
            "{} should be reported",
            name
        );
    }
}

#[test]
fn test_blog_batch_is_all_or_nothing() {
    init_tracing();

    let blog = Blog::from_records(vec![
        post(1, "foo", "2012-10-01"),
        post(2, "bar", "2012-10-02"),
        post(3, "baz", "not a date"),
    ]);
    assert_eq!(blog.len(), 0, "Valid records of a failed batch must not be ingested");
    assert!(blog.post("foo").is_none());
}

#[test]
fn test_blog_gives_posts_a_unique_slug() {
    init_tracing();

    let blog = Blog::from_records(vec![
        post(1, "foo", "2012-10-01"),
        post(2, "foo", "2012-10-02"),
        post(3, "foo", "2012-10-03"),
    ]);
    assert_eq!(blog.post("foo").unwrap().date(), day("2012-10-01"));
    assert_eq!(blog.post("foo-2").unwrap().date(), day("2012-10-02"));
    assert_eq!(blog.post("foo-3").unwrap().date(), day("2012-10-03"));
    assert!(is_sorted(&blog.select(&SelectOptions::new()).unwrap()));
}

#[test]
fn test_blog_assigns_slugs_oldest_first_regardless_of_input_order() {
    init_tracing();

    let blog = Blog::from_records(vec![
        post(1, "foo", "2012-10-03"),
        post(2, "foo", "2012-10-01"),
        post(3, "foo", "2012-10-02"),
    ]);
    assert_eq!(blog.post("foo").unwrap().date(), day("2012-10-01"));
    assert_eq!(blog.post("foo-2").unwrap().date(), day("2012-10-02"));
    assert_eq!(blog.post("foo-3").unwrap().date(), day("2012-10-03"));
    assert!(is_sorted(&blog.select(&SelectOptions::new()).unwrap()));
}

#[test]
fn test_blog_trusts_supplied_slugs() {
    init_tracing();

    let blog = Blog::from_records(vec![
        post(1, "foo", "2012-10-03").with_slug("foo-1"),
        post(2, "foo", "2012-10-01").with_slug("foo-2"),
        post(3, "foo", "2012-10-02").with_slug("foo-3"),
        post(4, "foo", "2012-10-04"),
    ]);
    assert_eq!(blog.post("foo-1").unwrap().date(), day("2012-10-03"));
    assert_eq!(blog.post("foo-2").unwrap().date(), day("2012-10-01"));
    assert_eq!(blog.post("foo-3").unwrap().date(), day("2012-10-02"));
    assert_eq!(blog.post("foo").unwrap().id(), "4", "Generated slug should avoid supplied ones");
    assert!(is_sorted(&blog.select(&SelectOptions::new()).unwrap()));
}

#[test]
fn test_blog_rejects_duplicate_supplied_slugs() {
    init_tracing();

    let blog = Blog::from_records(vec![
        post(1, "foo", "2012-10-01").with_slug("same"),
        post(2, "bar", "2012-10-02").with_slug("same"),
    ]);
    assert_eq!(blog.state(), BlogState::Failed);
}

#[test]
fn test_blog_selects_posts_newest_first() {
    init_tracing();

    let blog = Blog::from_records(vec![
        post(1, "foo", "2012-10-01"),
        post(2, "foo", "2012-10-02"),
        post(3, "bar", "2012-10-03"),
        post(4, "baz", "2012-10-04"),
    ]);
    let posts = blog.select(&SelectOptions::new()).unwrap();
    assert_eq!(titles(&posts), vec!["baz", "bar", "foo", "foo"]);
    assert_eq!(blog.count(&SelectOptions::new()).unwrap(), blog.len());
}

#[test]
fn test_blog_select_respects_limit_and_offset() {
    init_tracing();

    let blog = four_posts();

    let posts = blog.select(&SelectOptions::new().limit(2).offset(1)).unwrap();
    assert_eq!(titles(&posts), vec!["bar", "foo"]);

    let options = SelectOptions::from_json(&json!({ "limit": "2", "offset": "1" })).unwrap();
    assert_eq!(blog.select(&options).unwrap().len(), 2, "Numeric strings should be accepted");

    let posts = blog
        .select(&SelectOptions::new().query(json!({ "category": "foo" })).limit(1).offset(1))
        .unwrap();
    assert_eq!(titles(&posts), vec!["foobar"]);

    let posts = blog.select(&SelectOptions::new().limit(1)).unwrap();
    assert_eq!(titles(&posts), vec!["baz"]);

    let posts = blog.select(&SelectOptions::new().offset(1)).unwrap();
    assert_eq!(titles(&posts), vec!["bar", "foo", "foobar"]);
}

#[test]
fn test_blog_select_respects_page() {
    init_tracing();

    let blog = four_posts();
    let paged = blog.select(&SelectOptions::new().limit(2).page(2)).unwrap();
    assert_eq!(titles(&paged), vec!["foo", "foobar"]);

    let offset = blog.select(&SelectOptions::new().limit(2).offset(2)).unwrap();
    assert_eq!(ids(&paged), ids(&offset), "page 2 should equal offset (2-1)*limit");

    let ignored = blog.select(&SelectOptions::new().limit(2).offset(1).page(0)).unwrap();
    assert_eq!(titles(&ignored), vec!["bar", "foo"], "page 0 should leave the offset alone");
}

#[test]
fn test_blog_select_handles_bad_input() {
    init_tracing();

    let blog = four_posts();
    assert!(blog.select(&SelectOptions::new().limit(-10)).unwrap().is_empty());
    assert!(blog.select(&SelectOptions::new().limit(10).page(-1)).unwrap().is_empty());
    assert!(blog.select(&SelectOptions::new().limit(10).offset(-1)).unwrap().is_empty());
}

#[test]
fn test_blog_rejects_unknown_select_options() {
    init_tracing();

    let err = SelectOptions::from_json(&json!({ "foo": "bar" })).unwrap_err();
    assert_eq!(err, NetworkError::UnsupportedOption { key: "foo".to_string() });

    let err = SelectOptions::from_json(&json!({ "random": "yes" })).unwrap_err();
    assert!(matches!(err, NetworkError::InvalidOption { .. }));
}

#[test]
fn test_blog_counts_matched_posts() {
    init_tracing();

    let blog = Blog::from_records(vec![
        post(1, "foo", "2012-10-02"),
        post(2, "foo", "2012-10-03"),
        post(3, "baz", "2012-10-04"),
    ]);
    assert_eq!(blog.count(&SelectOptions::new()).unwrap(), 3);
    assert_eq!(blog.count(&SelectOptions::new().query(json!({ "title": "foo" }))).unwrap(), 2);
}

#[test]
fn test_blog_selects_posts_using_a_query() {
    init_tracing();

    let blog = Blog::from_records(vec![
        post(1, "foo", "2012-10-01").with_field("category", "bar"),
        post(2, "foo", "2012-10-02").with_field("category", "foo"),
        post(3, "bar", "2012-10-03").with_field("category", "bar"),
        post(4, "baz", "2012-10-04").with_field("category", "baz"),
    ]);
    let posts = blog.select(&SelectOptions::new().query(json!({ "category": "bar" }))).unwrap();
    assert_eq!(titles(&posts), vec!["bar", "foo"]);
    for post in posts {
        assert_eq!(post.field("category"), Some(&json!("bar")));
    }
}

#[test]
fn test_blog_maintains_prev_next_links() {
    init_tracing();

    let blog = Blog::from_records(vec![
        post(1, "foo1", "2012-10-01"),
        post(2, "foo2", "2012-10-02"),
        post(3, "bar1", "2012-10-03"),
        post(4, "bar2", "2012-10-04"),
    ]);
    let posts = blog.select(&SelectOptions::new()).unwrap();
    assert_eq!(titles(&posts), vec!["bar2", "bar1", "foo2", "foo1"]);

    assert!(blog.prev(posts[0]).is_none());
    assert_eq!(blog.next(posts[0]).map(Post::title), Some("bar1"));
    assert_eq!(blog.prev(posts[1]).map(Post::title), Some("bar2"));
    assert_eq!(blog.next(posts[1]).map(Post::title), Some("foo2"));
    assert_eq!(blog.prev(posts[2]).map(Post::title), Some("bar1"));
    assert_eq!(blog.next(posts[2]).map(Post::title), Some("foo1"));
    assert_eq!(blog.prev(posts[3]).map(Post::title), Some("foo2"));
    assert!(blog.next(posts[3]).is_none());
    assert_eq!(blog.last().map(Post::title), Some("foo1"));
}

#[test]
fn test_blog_ingests_a_large_newest_first_batch() {
    init_tracing();

    // Pairs of posts share a minute, listed newest first.
    let base = 1_356_998_400_000_i64;
    let records: Vec<RawPost> = (0..20_000_i64)
        .rev()
        .map(|i| RawPost::new(i, format!("post {}", i), base + (i / 2) * 60_000))
        .collect();
    let blog = Blog::from_records(records);
    assert_eq!(blog.state(), BlogState::Ready);
    assert_eq!(blog.len(), 20_000);

    let posts: Vec<&Post> = blog.posts().collect();
    assert!(is_sorted(&posts));
    let expected: Vec<String> = (0..20_000).rev().map(|i: i64| i.to_string()).collect();
    assert_eq!(ids(&posts), expected, "Equal dates keep their batch order");

    assert_eq!(blog.first().map(Post::id), Some("19999"));
    assert_eq!(blog.last().map(Post::id), Some("0"));
    assert!(blog.prev(posts[0]).is_none());
    assert!(blog.next(posts[posts.len() - 1]).is_none());
    for pair in posts.windows(2) {
        assert_eq!(blog.next(pair[0]).map(Post::id), Some(pair[1].id()));
        assert_eq!(blog.prev(pair[1]).map(Post::id), Some(pair[0].id()));
    }
}

#[test]
fn test_blog_merges_initial_batch_with_earlier_posts() {
    init_tracing();

    let mut blog = Blog::new();
    blog.handle(LoaderEvent::PostAdded(post(10, "early", "2013-06-14")));
    blog.handle(LoaderEvent::PostAdded(post(11, "late", "2013-06-20")));
    blog.handle(LoaderEvent::Loaded(vec![
        post(1, "newest", "2013-06-25"),
        post(2, "tie", "2013-06-20"),
        post(3, "middle", "2013-06-16"),
        post(4, "oldest", "2013-06-01"),
    ]));
    assert!(blog.is_ready());

    let posts: Vec<&Post> = blog.posts().collect();
    assert_eq!(
        titles(&posts),
        vec!["newest", "late", "tie", "middle", "early", "oldest"],
        "Posts linked before the batch stay ahead on equal dates"
    );
    for pair in posts.windows(2) {
        assert_eq!(blog.next(pair[0]).map(Post::id), Some(pair[1].id()));
        assert_eq!(blog.prev(pair[1]).map(Post::id), Some(pair[0].id()));
    }
    assert_eq!(blog.last().map(Post::title), Some("oldest"));
}

#[test]
fn test_blog_random_selection_is_drawn_from_all_matches() {
    init_tracing();

    let blog = Blog::from_records(vec![
        post(1, "foo1", "2012-10-01").with_field("category", "bar"),
        post(2, "foo2", "2012-09-01").with_field("category", "bar"),
        post(3, "foo3", "2012-08-01").with_field("category", "foo"),
    ]);
    let query = json!({ "category": "bar" });

    let mut seen = std::collections::HashSet::new();
    for seed in 0..32 {
        let mut rng = StdRng::seed_from_u64(seed);
        let posts = blog
            .select_with_rng(&SelectOptions::new().query(query.clone()).limit(1).random(true), &mut rng)
            .unwrap();
        assert_eq!(posts.len(), 1);
        assert!(posts[0].title() == "foo1" || posts[0].title() == "foo2");
        seen.insert(posts[0].title().to_string());
    }
    assert_eq!(seen.len(), 2, "Both matching posts should come up across seeds");

    let posts = blog.select(&SelectOptions::new().query(query).random(true)).unwrap();
    assert_eq!(posts.len(), 2);
}

#[test]
fn test_blog_uses_post_matcher_when_available() {
    init_tracing();

    let blog = Blog::from_records(vec![
        post(1, "foo1", "2012-10-01").with_field("category", "bar").with_matcher(category_match),
        post(2, "foo2", "2012-09-01").with_field("category", "bar").with_matcher(category_match),
        post(3, "foo3", "2012-08-01").with_field("category", "foo").with_matcher(category_match),
    ]);
    let options = SelectOptions::new().query(json!("bar"));
    let posts = blog.select(&options).unwrap();
    assert_eq!(titles(&posts), vec!["foo1", "foo2"]);
    assert_eq!(blog.count(&options).unwrap(), 2);
}

#[test]
fn test_blog_stop_verdict_keeps_partial_results() {
    init_tracing();

    let calls = Arc::new(AtomicUsize::new(0));
    let records = (1..=3)
        .map(|n| {
            let calls = Arc::clone(&calls);
            post(n, &format!("foo{}", n), &format!("2012-10-0{}", 4 - n)).with_matcher(move |_, _| {
                if calls.fetch_add(1, Ordering::SeqCst) + 1 == 3 {
                    Ok(Verdict::Stop)
                } else {
                    Ok(Verdict::Match)
                }
            })
        })
        .collect();
    let blog = Blog::from_records(records);

    let posts = blog.select(&SelectOptions::new().query(json!({ "category": "bar" }))).unwrap();
    assert_eq!(titles(&posts), vec!["foo1", "foo2"], "Stop should truncate, not fail");
}

#[test]
fn test_blog_propagates_matcher_errors() {
    init_tracing();

    let blog = Blog::from_records(vec![
        post(1, "foo1", "2012-10-01").with_matcher(|_, _| Err(MatchError::new("broken"))),
        post(2, "foo2", "2012-09-01"),
    ]);
    let err = blog.select(&SelectOptions::new().query(json!({ "category": "bar" }))).unwrap_err();
    assert_eq!(err, NetworkError::Predicate(MatchError::new("broken")));

    let all = blog.select(&SelectOptions::new()).unwrap();
    assert_eq!(all.len(), 2, "Without a query no matcher runs");
}

#[test]
fn test_blog_propagates_loader_errors() {
    init_tracing();

    let mut loader = StaticLoader::failing("disk on fire");
    let mut blog = Blog::new();
    blog.pump(&mut loader);

    assert_eq!(blog.state(), BlogState::Failed);
    assert_eq!(
        blog.drain_events(),
        vec![BlogEvent::Error(NetworkError::Loader("disk on fire".to_string()))]
    );
}

#[test]
fn test_blog_rejects_a_second_initial_batch() {
    init_tracing();

    let mut blog = Blog::from_records(vec![post(1, "foo", "2012-10-01")]);
    blog.drain_events();
    let err = blog.ingest_initial_batch(vec![post(2, "bar", "2012-10-02")]).unwrap_err();
    assert_eq!(err, NetworkError::AlreadyLoaded);
    assert_eq!(blog.state(), BlogState::Ready, "Errors after ready keep the state");
    assert_eq!(blog.len(), 1);
}

#[test]
fn test_blog_listens_for_new_posts() {
    init_tracing();

    let mut loader = StaticLoader::new(vec![
        post(1, "foo", "2012-10-01"),
        post(2, "foo", "2012-10-02"),
        post(3, "foo", "2012-10-03"),
    ]);
    let mut blog = Blog::new();
    blog.pump(&mut loader);
    assert_eq!(blog.drain_events(), vec![BlogEvent::Ready]);
    assert_eq!(blog.len(), 3);

    loader.add_post(post(4, "bar", "2012-10-04"));
    blog.pump(&mut loader);
    let posts = blog.select(&SelectOptions::new()).unwrap();
    assert_eq!(posts.len(), 4);
    assert!(is_sorted(&posts));
    assert_eq!(blog.post("bar").map(Post::title), Some("bar"));

    loader.add_post(post(5, "baz", "2012-10-02"));
    blog.pump(&mut loader);
    let posts = blog.select(&SelectOptions::new()).unwrap();
    assert_eq!(ids(&posts), vec!["4", "3", "2", "5", "1"], "Equal dates keep insertion order");
    assert_eq!(blog.count(&SelectOptions::new()).unwrap(), 5);
    assert!(blog.drain_events().is_empty(), "Valid mutations emit nothing");
}

#[test]
fn test_blog_rejects_invalid_new_posts() {
    init_tracing();

    let mut loader = StaticLoader::new(vec![post(1, "foo", "2012-10-01")]);
    loader
        .add_post(RawPost {
            id: Some(json!(2)),
            ..Default::default()
        })
        .add_post(RawPost {
            title: Some("Foobar".to_string()),
            date: Some(json!("2012-10-10")),
            ..Default::default()
        })
        .add_post(post(1, "foo", "2012-10-10"));

    let mut blog = Blog::new();
    blog.pump(&mut loader);

    let errors: Vec<BlogEvent> = blog
        .drain_events()
        .into_iter()
        .filter(|event| matches!(event, BlogEvent::Error(_)))
        .collect();
    assert_eq!(
        errors,
        vec![
            BlogEvent::Error(ValidationError::MissingDate { id: "2".to_string() }.into()),
            BlogEvent::Error(ValidationError::MissingId.into()),
            BlogEvent::Error(ValidationError::DuplicateId { id: "1".to_string() }.into()),
        ]
    );
    assert_eq!(blog.state(), BlogState::Ready);
    assert_eq!(blog.len(), 1, "Invalid mutations must not touch existing posts");
    assert_eq!(blog.first().map(Post::date), Some(day("2012-10-01")));
}

#[test]
fn test_blog_removes_posts() {
    init_tracing();

    let mut loader = StaticLoader::new(vec![
        post(1, "foo", "2012-10-01"),
        post(2, "foo", "2012-10-02"),
        post(3, "foo", "2012-10-03"),
    ]);
    let mut blog = Blog::new();
    blog.pump(&mut loader);

    loader.push(LoaderEvent::PostRemoved(PostRef::from(post(2, "foo", "2012-10-02"))));
    blog.pump(&mut loader);
    let posts = blog.select(&SelectOptions::new()).unwrap();
    assert_eq!(ids(&posts), vec!["3", "1"]);
    assert!(blog.post("foo-2").is_none());

    let foo = blog.post("foo").unwrap();
    assert_eq!(foo.id(), "1");
    assert!(blog.next(foo).is_none());
    let newer = blog.prev(foo).unwrap();
    assert_eq!(newer.id(), "3");
    assert_eq!(blog.next(newer).map(Post::id), Some("1"));
    assert!(blog.prev(newer).is_none());

    loader.remove_post(1);
    blog.pump(&mut loader);
    assert!(blog.post("foo").is_none());
    let last = blog.post("foo-3").unwrap();
    assert!(blog.prev(last).is_none() && blog.next(last).is_none());
    assert_eq!(blog.count(&SelectOptions::new()).unwrap(), 1);

    loader.remove_post(42);
    blog.pump(&mut loader);
    assert_eq!(
        blog.drain_events().pop(),
        Some(BlogEvent::Error(ValidationError::UnknownPost { id: "42".to_string() }.into()))
    );
}

#[test]
fn test_blog_updates_posts() {
    init_tracing();

    let mut loader = StaticLoader::new(vec![post(1, "Foo", "2012-10-01")]);
    let mut blog = Blog::new();
    blog.pump(&mut loader);
    assert_eq!(blog.post("foo").map(Post::id), Some("1"));

    loader.update_post(post(1, "Bar", "2012-10-01"));
    blog.pump(&mut loader);
    assert!(blog.post("foo").is_none(), "Old slug should be released");
    let bar = blog.post("bar").unwrap();
    assert_eq!(bar.id(), "1");
    assert_eq!(bar.title(), "Bar");
    assert_eq!(blog.len(), 1);

    loader.update_post(post(7, "Nope", "2012-10-01"));
    blog.pump(&mut loader);
    assert_eq!(
        blog.drain_events().pop(),
        Some(BlogEvent::Error(ValidationError::UnknownPost { id: "7".to_string() }.into()))
    );
}

#[test]
fn test_blog_update_moves_posts_when_the_date_changes() {
    init_tracing();

    let mut blog = Blog::from_records(vec![
        post(1, "one", "2012-10-01"),
        post(2, "two", "2012-10-02"),
        post(3, "three", "2012-10-03"),
    ]);
    blog.apply_updated_post(post(1, "one", "2012-10-05")).unwrap();

    let posts = blog.select(&SelectOptions::new()).unwrap();
    assert_eq!(ids(&posts), vec!["1", "3", "2"]);
    assert_eq!(blog.post("one").map(Post::id), Some("1"), "Same title keeps the slug");
    assert_eq!(blog.last().map(Post::id), Some("2"));
}

#[test]
fn test_blog_links_posts_added_before_the_initial_batch() {
    init_tracing();

    let mut blog = Blog::new();
    blog.handle(LoaderEvent::PostAdded(post(1, "Foo", "2013-06-15")));
    assert_eq!(ids(&blog.posts().collect::<Vec<_>>()), vec!["1"]);
    let first = blog.first().unwrap();
    assert!(blog.prev(first).is_none() && blog.next(first).is_none());

    blog.handle(LoaderEvent::PostAdded(post(2, "Bar", "2013-06-13")));
    blog.handle(LoaderEvent::PostAdded(post(3, "Baz", "2013-07-13")));
    blog.handle(LoaderEvent::PostAdded(post(4, "Qux", "2013-06-14")));
    let posts: Vec<&Post> = blog.posts().collect();
    assert_eq!(ids(&posts), vec!["3", "1", "4", "2"]);
    assert_eq!(blog.next(posts[1]).map(Post::id), Some("4"));
    assert_eq!(blog.prev(posts[3]).map(Post::id), Some("4"));

    blog.handle(LoaderEvent::PostUpdated(post(4, "Fooqux", "2013-06-14")));
    let posts: Vec<&Post> = blog.posts().collect();
    assert_eq!(blog.next(posts[1]).map(Post::title), Some("Fooqux"));
    assert_eq!(blog.prev(posts[3]).map(Post::title), Some("Fooqux"));

    blog.handle(LoaderEvent::PostRemoved(PostRef::Id(json!(4))));
    let posts: Vec<&Post> = blog.posts().collect();
    assert_eq!(ids(&posts), vec!["3", "1", "2"]);
    assert_eq!(blog.next(posts[1]).map(Post::id), Some("2"));
    assert_eq!(blog.prev(posts[2]).map(Post::id), Some("1"));
    assert_eq!(blog.state(), BlogState::Loading, "Mutations do not make a blog ready");
}

#[test]
fn test_blog_fills_results_with_random_posts() {
    init_tracing();

    let blog = Blog::from_records(vec![
        post(1, "foo", "2012-10-01").with_field("category", "foo"),
        post(2, "foo", "2012-10-01"),
        post(3, "foo", "2012-10-01"),
    ]);
    let narrow = || SelectOptions::new().query(json!({ "category": "foo" }));

    let posts = blog.select(&narrow().limit(2)).unwrap();
    assert_eq!(ids(&posts), vec!["1"]);

    let posts = blog.select(&narrow().limit(2).fill(true)).unwrap();
    assert_eq!(posts.len(), 2);
    assert_eq!(posts[0].id(), "1");
    assert!(posts[1].id() == "2" || posts[1].id() == "3");

    let exclusion_forms = [json!([1]), json!(1), json!({ "1": true })];
    for not in exclusion_forms {
        let options = SelectOptions::from_json(&json!({
            "query": { "category": "foo" },
            "limit": 2,
            "fill": true,
            "not": not,
        }))
        .unwrap();
        let posts = blog.select(&options).unwrap();
        let mut got = ids(&posts);
        got.sort();
        assert_eq!(got, vec!["2", "3"], "Excluded post should not come back as padding");
    }

    let posts = blog.select(&narrow().limit(3).fill(true)).unwrap();
    assert_eq!(posts.len(), 3);
    assert_eq!(posts[0].id(), "1");

    let posts = blog.select(&narrow().limit(4).fill(true)).unwrap();
    assert_eq!(posts.len(), 3, "Padding cannot exceed the eligible posts");
    assert_eq!(posts[0].id(), "1");
}

#[test]
fn test_blog_keeps_order_through_mixed_mutations() {
    init_tracing();

    let mut blog = Blog::from_records(vec![
        post(1, "a", "2012-10-05"),
        post(2, "b", "2012-10-01"),
        post(3, "c", "2012-10-09"),
    ]);
    blog.apply_new_post(post(4, "d", "2012-10-07")).unwrap();
    blog.apply_removed_post(PostRef::Id(json!(3))).unwrap();
    blog.apply_updated_post(post(2, "b", "2012-10-08")).unwrap();
    blog.apply_new_post(post(5, "e", "2012-10-03")).unwrap();

    let posts: Vec<&Post> = blog.posts().collect();
    assert!(is_sorted(&posts));
    assert_eq!(ids(&posts), vec!["2", "4", "1", "5"]);
    assert_eq!(blog.get("5").map(Post::slug), Some("e"));
    assert!(blog.get("3").is_none());
}
