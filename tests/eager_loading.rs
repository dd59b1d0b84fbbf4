//! Integration tests for nested eager loading.
//!
//! These tests drive a three-level Author -> posts -> comments registry the
//! way a request handler would: prepare the root query, then materialize the
//! installed relation hooks and check that every nesting level saw only its
//! own namespace's options.

use std::sync::Arc;

use eagerly::{
    Catalog, ContextDescriptor, ErrorKind, ModelDef, OptionKey, OptionSource, OptionValue,
    ParsedOptions, PrepareError, Preparer, Query, QueryFilter, QueryPlan, Record, Registry,
    RequestOptions, SortOrder,
};

fn blog_registry() -> Arc<Registry<QueryPlan>> {
    let catalog = Catalog::new()
        .model(ModelDef::new("Author", "users"))
        .model(ModelDef::new("Post", "posts"))
        .model(ModelDef::new("Comment", "comments"));

    let registry = Arc::new(Registry::new(catalog));

    registry
        .register(
            "Author",
            Preparer::new("Author", "users").extend(|query, namespace, run| {
                run.load("Post", query, namespace, None)?;
                run.load_count("Post", query, namespace, None)
            }),
        )
        .expect("register Author");

    registry
        .register(
            "Post",
            Preparer::new("Post", "posts")
                .context(
                    "Author",
                    ContextDescriptor::new("posts").foreign_key("posts.author_id"),
                )
                .extend(|query, namespace, run| run.load("Comment", query, namespace, None)),
        )
        .expect("register Post");

    registry
        .register(
            "Comment",
            Preparer::new("Comment", "comments").context(
                "Post",
                ContextDescriptor::new("comments").foreign_key("comments.post_id"),
            ),
        )
        .expect("register Comment");

    registry
}

fn options(parsed: ParsedOptions) -> Arc<dyn OptionSource> {
    Arc::new(RequestOptions::new(parsed))
}

/// Prepare a root query with two nested include levels and constraints at
/// every namespace, then materialize both hooks.
#[test]
fn test_three_level_include_tree() {
    let registry = blog_registry();
    let opts = options(
        ParsedOptions::new()
            .include("posts")
            .include("posts.comments")
            .option("", OptionKey::Order, ["name"])
            .option("posts", OptionKey::Limit, [5i64])
            .option(
                "posts.comments",
                OptionKey::Where,
                [OptionValue::from("approved"), OptionValue::Bool(true)],
            ),
    );

    let mut author = registry
        .prepare("Author", &opts, None)
        .expect("prepare Author");

    // Root level: primary key plus the pre-selected foreign key, root order.
    assert_eq!(author.selects(), ["users.id", "posts.author_id"]);
    assert_eq!(author.orders(), [("name".to_string(), SortOrder::Asc)]);
    assert_eq!(author.eager_relations(), ["posts"]);

    // First hop: the posts subquery sees the "posts" namespace only.
    let mut posts = QueryPlan::new_for("posts", "Post").as_has_many("posts.author_id");
    assert!(author.apply_eager("posts", &mut posts).expect("posts hook"));
    assert_eq!(
        posts.selects(),
        ["posts.id", "posts.author_id", "comments.post_id"]
    );
    assert_eq!(posts.limit(), Some(5));
    assert!(posts.orders().is_empty());
    assert_eq!(posts.eager_relations(), ["comments"]);

    // Second hop: the comments subquery sees "posts.comments".
    let mut comments = QueryPlan::new_for("comments", "Comment").as_has_many("comments.post_id");
    assert!(posts
        .apply_eager("comments", &mut comments)
        .expect("comments hook"));
    assert_eq!(comments.selects(), ["comments.id", "comments.post_id"]);
    assert_eq!(
        comments.filters(),
        [QueryFilter::Compare {
            field: "approved".to_string(),
            op: "=".to_string(),
            value: OptionValue::Bool(true),
        }]
    );
    assert_eq!(comments.limit(), None);
}

/// Relations the request never asked for leave the query untouched.
#[test]
fn test_nothing_included_prepares_bare_query() {
    let registry = blog_registry();
    let author = registry
        .prepare("Author", &options(ParsedOptions::new()), None)
        .expect("prepare Author");

    assert_eq!(author.selects(), ["users.id"]);
    assert!(author.eager_relations().is_empty());
    assert!(!author.has_eager());
}

/// Root-level constraints stay at the root: a limit with no namespace never
/// reaches the relation subquery, and vice versa.
#[test]
fn test_namespaces_do_not_leak() {
    let registry = blog_registry();
    let opts = options(
        ParsedOptions::new()
            .include("posts")
            .option("", OptionKey::Limit, [3i64]),
    );

    let mut author = registry
        .prepare("Author", &opts, None)
        .expect("prepare Author");
    assert_eq!(author.limit(), Some(3));

    let mut posts = QueryPlan::new_for("posts", "Post").as_has_many("posts.author_id");
    author.apply_eager("posts", &mut posts).expect("posts hook");
    assert_eq!(posts.limit(), None);
}

/// Include paths match both the declared relation spelling and its
/// snake_case form.
#[test]
fn test_include_tolerates_snake_case_spelling() {
    let catalog = Catalog::new()
        .model(ModelDef::new("Author", "users"))
        .model(ModelDef::new("Post", "posts"));
    let registry = Arc::new(Registry::<QueryPlan>::new(catalog));
    registry
        .register(
            "Author",
            Preparer::new("Author", "users")
                .extend(|query, namespace, run| run.load("Post", query, namespace, None)),
        )
        .expect("register Author");
    registry
        .register(
            "Post",
            Preparer::new("Post", "posts")
                .context("Author", ContextDescriptor::new("latestPosts")),
        )
        .expect("register Post");

    let opts = options(ParsedOptions::new().include("latest_posts"));
    let author = registry
        .prepare("Author", &opts, None)
        .expect("prepare Author");

    assert_eq!(author.eager_relations(), ["latestPosts"]);
}

/// A requested relation count on a pending query becomes a native count
/// eager load.
#[test]
fn test_count_included_on_query() {
    let registry = blog_registry();
    let opts = options(ParsedOptions::new().include("posts_count"));

    let author = registry
        .prepare("Author", &opts, None)
        .expect("prepare Author");

    assert!(author.has_count("posts"));
    assert!(author.eager_relations().is_empty());
}

/// On an already-materialized entity the count is computed directly from the
/// loaded relation rows and assigned to the count-named field.
#[test]
fn test_count_fallback_on_entity() {
    let registry = blog_registry();
    let opts = options(ParsedOptions::new().include("posts_count"));

    let mut author = Record::new("Author").value("id", 1i64).relation(
        "posts",
        vec![
            Record::new("Post").value("id", 10i64),
            Record::new("Post").value("id", 11i64),
            Record::new("Post").value("id", 12i64),
        ],
    );
    registry
        .load_on_context("Post", &opts, &mut author, "", None, true)
        .expect("load count");

    assert_eq!(author.get("posts_count"), Some(&OptionValue::Int(3)));
}

/// Loading a full relation onto an entity installs the same prepared hook a
/// pending query would get.
#[test]
fn test_full_load_on_entity() {
    let registry = blog_registry();
    let opts = options(
        ParsedOptions::new()
            .include("posts")
            .option("posts", OptionKey::Offset, [20i64]),
    );

    let mut author = Record::new("Author").value("id", 1i64);
    registry
        .load_on_context("Post", &opts, &mut author, "", None, false)
        .expect("load posts");
    assert_eq!(author.selects(), ["posts.author_id"]);
    assert_eq!(author.eager_relations(), ["posts"]);

    let mut posts = QueryPlan::new_for("posts", "Post").as_has_many("posts.author_id");
    assert!(author.apply_eager("posts", &mut posts).expect("posts hook"));
    assert_eq!(posts.offset(), Some(20));
}

/// Preparing a model nobody registered fails before any query is touched.
#[test]
fn test_unregistered_model_errors() {
    let catalog = Catalog::new().model(ModelDef::new("Author", "users"));
    let registry = Arc::new(Registry::<QueryPlan>::new(catalog));

    let err = registry
        .prepare("Author", &options(ParsedOptions::new()), None)
        .expect_err("must fail");

    assert!(matches!(err, PrepareError::UnregisteredModel(_)));
    assert_eq!(err.kind(), ErrorKind::Usage);
}

/// A stale option source is re-parsed before the next preparation reads it.
#[test]
fn test_stale_options_refresh_before_prepare() {
    use std::sync::atomic::{AtomicBool, Ordering};

    let registry = blog_registry();

    // First parse yields nothing; the re-parse after mark_stale carries the
    // limit.
    let reparsed = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&reparsed);
    let reloaded = RequestOptions::with_reload(move || {
        if flag.swap(true, Ordering::SeqCst) {
            ParsedOptions::new().option("", OptionKey::Limit, [7i64])
        } else {
            ParsedOptions::new()
        }
    });
    reloaded.mark_stale();
    let opts: Arc<dyn OptionSource> = Arc::new(reloaded);

    let author = registry
        .prepare("Author", &opts, None)
        .expect("prepare Author");
    assert_eq!(author.limit(), Some(7));
}
