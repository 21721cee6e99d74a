//! Site administration: moderating groups, posts, comments and follows. Served on the internal
//! listener only, so there's no authentication.
use crate::api::{
    forms::{GroupForm, RegroupForm},
    observe, State,
};
use crate::datastore::{
    postfilters::{PostFilters, Window},
    structs::{Comment, Follow, Group, NewGroup, Post, PostWithRefs},
    Datastore,
};
use crate::twoface::{Cause, Fallible, OrNotFound, TfError};
use actix_web::{web, HttpResponse};
use chrono::{offset::Utc, DateTime};
use serde::{Deserialize, Serialize};
use tracing::info;

const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 1000;

pub fn configure<DS: Datastore>(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/groups")
            .route(web::get().to(list_groups::<DS>))
            .route(web::post().to(create_group::<DS>)),
    )
    .route("/groups/{slug}", web::delete().to(delete_group::<DS>))
    .route("/posts", web::get().to(list_posts::<DS>))
    .service(
        web::resource("/posts/{post_id}")
            .route(web::patch().to(regroup_post::<DS>))
            .route(web::delete().to(delete_post::<DS>)),
    )
    .route("/comments", web::get().to(list_comments::<DS>))
    .route("/comments/{comment_id}", web::delete().to(delete_comment::<DS>))
    .route("/follows", web::get().to(list_follows::<DS>))
    .route("/cache", web::delete().to(clear_cache::<DS>));
}

#[derive(Deserialize, Debug, Default)]
pub struct SearchQuery {
    /// Case-insensitive substring to search for
    pub q: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Deserialize, Debug, Default)]
pub struct AdminPostQuery {
    pub q: Option<String>,
    /// Group slug
    pub group: Option<String>,
    pub published_after: Option<DateTime<Utc>>,
    pub published_before: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

fn limit_or_default(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIMIT).max(0).min(MAX_LIMIT)
}

fn blank_as_none(q: &Option<String>) -> Option<String> {
    q.as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(str::to_owned)
}

/// One row of the post listing.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct AdminPostRow {
    pub id: i32,
    pub text: String,
    pub pub_date: DateTime<Utc>,
    pub author: String,
    pub group: Option<String>,
    pub image: Option<String>,
}

impl From<PostWithRefs> for AdminPostRow {
    fn from(p: PostWithRefs) -> Self {
        Self {
            id: p.post.id,
            text: p.post.text,
            pub_date: p.post.pub_date,
            author: p.author.username,
            group: p.group.map(|g| g.slug),
            image: p.post.image,
        }
    }
}

#[derive(Serialize)]
struct Cleared {
    cleared: usize,
}

async fn list_groups<DS: Datastore>(
    state: web::Data<State<DS>>,
    query: web::Query<SearchQuery>,
) -> Fallible<web::Json<Vec<Group>>> {
    observe("admin_list_groups", || async {
        let groups = state.ds.list_groups(blank_as_none(&query.q)).await?;
        Ok(web::Json(groups))
    })
    .await
}

async fn create_group<DS: Datastore>(
    state: web::Data<State<DS>>,
    form: web::Json<GroupForm>,
) -> Fallible<HttpResponse> {
    observe("admin_create_group", || async {
        form.check()?;
        let group = state
            .ds
            .new_group(NewGroup {
                title: form.title.trim().to_owned(),
                slug: form.slug.clone(),
                description: form.description.clone(),
            })
            .await?;
        info!(slug = &group.slug[..], "created group");
        Ok(HttpResponse::Created().json(group))
    })
    .await
}

async fn delete_group<DS: Datastore>(
    state: web::Data<State<DS>>,
    slug: web::Path<String>,
) -> Fallible<web::Json<Group>> {
    observe("admin_delete_group", || async {
        let group = state
            .ds
            .delete_group(&slug)
            .await?
            .or_not_found("Group not found")?;
        info!(slug = &group.slug[..], "deleted group");
        Ok(web::Json(group))
    })
    .await
}

async fn list_posts<DS: Datastore>(
    state: web::Data<State<DS>>,
    query: web::Query<AdminPostQuery>,
) -> Fallible<web::Json<Vec<AdminPostRow>>> {
    observe("admin_list_posts", || async {
        let group_id = match blank_as_none(&query.group) {
            Some(slug) => Some(
                state
                    .ds
                    .find_group(&slug)
                    .await?
                    .or_not_found("Group not found")?
                    .id,
            ),
            None => None,
        };
        let filters = PostFilters {
            group_id,
            text_contains: blank_as_none(&query.q),
            published_after: query.published_after,
            published_before: query.published_before,
            ..Default::default()
        };
        let window = Window {
            offset: query.offset.unwrap_or(0).max(0),
            limit: limit_or_default(query.limit),
        };
        let rows = state
            .ds
            .list_posts(filters, window)
            .await?
            .into_iter()
            .map(AdminPostRow::from)
            .collect();
        Ok(web::Json(rows))
    })
    .await
}

async fn regroup_post<DS: Datastore>(
    state: web::Data<State<DS>>,
    post_id: web::Path<i32>,
    form: web::Json<RegroupForm>,
) -> Fallible<web::Json<Post>> {
    observe("admin_regroup_post", || async {
        let group_id = match form.group_slug() {
            Some(slug) => match state.ds.find_group(slug).await? {
                Some(group) => Some(group.id),
                None => {
                    return Err(TfError::reject(
                        Cause::UserInvalidField,
                        "Select a valid choice. That group is not one of the available choices",
                    ))
                }
            },
            None => None,
        };
        let post = state
            .ds
            .set_post_group(*post_id, group_id)
            .await?
            .or_not_found("Post not found")?;
        info!(post_id = post.id, ?group_id, "moved post");
        Ok(web::Json(post))
    })
    .await
}

async fn delete_post<DS: Datastore>(
    state: web::Data<State<DS>>,
    post_id: web::Path<i32>,
) -> Fallible<web::Json<Post>> {
    observe("admin_delete_post", || async {
        let post = state
            .ds
            .delete_post(*post_id)
            .await?
            .or_not_found("Post not found")?;
        info!(post_id = post.id, "deleted post");
        Ok(web::Json(post))
    })
    .await
}

async fn list_comments<DS: Datastore>(
    state: web::Data<State<DS>>,
    query: web::Query<SearchQuery>,
) -> Fallible<web::Json<Vec<Comment>>> {
    observe("admin_list_comments", || async {
        let comments = state
            .ds
            .search_comments(blank_as_none(&query.q), limit_or_default(query.limit))
            .await?;
        Ok(web::Json(comments))
    })
    .await
}

async fn delete_comment<DS: Datastore>(
    state: web::Data<State<DS>>,
    comment_id: web::Path<i32>,
) -> Fallible<web::Json<Comment>> {
    observe("admin_delete_comment", || async {
        let comment = state
            .ds
            .delete_comment(*comment_id)
            .await?
            .or_not_found("Comment not found")?;
        info!(comment_id = comment.id, "deleted comment");
        Ok(web::Json(comment))
    })
    .await
}

async fn list_follows<DS: Datastore>(
    state: web::Data<State<DS>>,
) -> Fallible<web::Json<Vec<Follow>>> {
    observe("admin_list_follows", || async {
        Ok(web::Json(state.ds.list_follows().await?))
    })
    .await
}

async fn clear_cache<DS: Datastore>(state: web::Data<State<DS>>) -> Fallible<web::Json<Cleared>> {
    observe("admin_clear_cache", || async {
        let cleared = state.index_cache.clear();
        info!(cleared = cleared as u64, "cleared index cache");
        Ok(web::Json(Cleared { cleared }))
    })
    .await
}
