use crate::datastore::{
    postfilters::PostFilters,
    structs::{CommentWithAuthor, Group, PostWithRefs, User},
    Datastore,
};
use crate::metrics;
use crate::twoface::{Cause, ExternalError, Fallible, TfError};
use actix_web::{error::JsonPayloadError, http::header, web, HttpResponse};
use anyhow::anyhow;
use cache::PageCache;
use chrono::{offset::Utc, DateTime};
use mail::Mailer;
use media::MediaStore;
use paginator::{Page, Paginator};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

#[cfg(test)]
macro_rules! test_app {
    ($state:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .data($state.state.clone())
                .data($state.tokens.clone())
                .app_data(crate::api::json_config(1024 * 1024))
                .app_data(crate::api::path_config())
                .app_data(crate::api::query_config())
                .configure(crate::api::configure_userfacing::<crate::datastore::mock::Client>)
                .service(
                    actix_web::web::scope("/admin")
                        .configure(crate::api::admin::configure::<crate::datastore::mock::Client>),
                )
                .default_service(actix_web::web::route().to(crate::api::not_found)),
        )
        .await
    };
}

pub mod about;
pub mod admin;
pub mod auth;
pub mod cache;
pub mod forms;
pub mod mail;
pub mod media;
pub mod paginator;
pub mod passwords;
pub mod userfacing;
pub mod users;

/// Everything a handler needs, shared by every worker.
pub struct State<DS> {
    pub ds: Arc<DS>,
    pub index_cache: Arc<PageCache>,
    pub media: Arc<MediaStore>,
    pub mailer: Arc<Mailer>,
    pub posts_per_page: i64,
    /// Prefix for links sent by email
    pub site_url: String,
}

// Derive would needlessly require `DS: Clone`.
impl<DS> Clone for State<DS> {
    fn clone(&self) -> Self {
        Self {
            ds: Arc::clone(&self.ds),
            index_cache: Arc::clone(&self.index_cache),
            media: Arc::clone(&self.media),
            mailer: Arc::clone(&self.mailer),
            posts_per_page: self.posts_per_page,
            site_url: self.site_url.clone(),
        }
    }
}

/// Every route served on the userfacing listener.
pub fn configure_userfacing<DS: Datastore>(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/auth").configure(users::configure::<DS>))
        .service(web::scope("/about").configure(about::configure))
        .route("/media/posts/{file_name}", web::get().to(media_file::<DS>));
    userfacing::configure::<DS>(cfg);
}

/// JSON bodies that don't parse get the same error body as every other failure.
pub fn json_config(max_body_size: usize) -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(max_body_size)
        .error_handler(|err, _req| {
            let text = match &err {
                JsonPayloadError::Overflow => "Request body is too large",
                JsonPayloadError::ContentType => "Request body must be JSON",
                _ => "Request body is not a valid form",
            };
            TfError {
                internal: anyhow!("couldn't read JSON body: {}", err),
                external: ExternalError::invalid_field(text),
            }
            .into()
        })
}

/// A path segment of the wrong type (e.g. `/posts/abc/`) can't name anything, so it's a 404.
pub fn path_config() -> web::PathConfig {
    web::PathConfig::default().error_handler(|err, _req| {
        TfError {
            internal: anyhow!("couldn't parse path: {}", err),
            external: ExternalError {
                cause: Cause::NotFound,
                text: "Page not found",
            },
        }
        .into()
    })
}

pub fn query_config() -> web::QueryConfig {
    web::QueryConfig::default().error_handler(|err, _req| {
        TfError {
            internal: anyhow!("couldn't parse query string: {}", err),
            external: ExternalError::invalid_field("Invalid query string"),
        }
        .into()
    })
}

/// Fallback for every unknown route.
pub async fn not_found() -> Fallible<HttpResponse> {
    Err(TfError::reject(Cause::NotFound, "Page not found"))
}

async fn media_file<DS: Datastore>(
    state: web::Data<State<DS>>,
    file_name: web::Path<String>,
) -> Fallible<HttpResponse> {
    state.media.serve(&file_name).await
}

/// Paths that form submissions point the client to afterwards.
pub mod urls {
    pub fn index() -> String {
        "/".to_owned()
    }

    pub fn profile(username: &str) -> String {
        format!("/profile/{}/", username)
    }

    pub fn post_detail(post_id: i32) -> String {
        format!("/posts/{}/", post_id)
    }

    pub fn post_edit(post_id: i32) -> String {
        format!("/posts/{}/edit/", post_id)
    }

    pub fn add_comment(post_id: i32) -> String {
        format!("/posts/{}/comment/", post_id)
    }
}

/// The client should go look at `location` now.
pub fn see_other(location: String) -> HttpResponse {
    HttpResponse::SeeOther()
        .header(header::LOCATION, location)
        .finish()
}

/// A user as other users see them. Never includes credentials.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UserFacingUser {
    pub id: i32,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
}

impl From<User> for UserFacingUser {
    fn from(u: User) -> Self {
        Self {
            full_name: u.full_name(),
            id: u.id,
            username: u.username,
            first_name: u.first_name,
            last_name: u.last_name,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UserFacingGroup {
    pub id: i32,
    pub title: String,
    pub slug: String,
    pub description: String,
}

impl From<Group> for UserFacingGroup {
    fn from(g: Group) -> Self {
        Self {
            id: g.id,
            title: g.title,
            slug: g.slug,
            description: g.description,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UserFacingPost {
    pub id: i32,
    pub text: String,
    pub pub_date: DateTime<Utc>,
    pub author: UserFacingUser,
    pub group: Option<UserFacingGroup>,
    /// URL of the post's image
    pub image: Option<String>,
}

impl From<PostWithRefs> for UserFacingPost {
    fn from(p: PostWithRefs) -> Self {
        Self {
            id: p.post.id,
            text: p.post.text,
            pub_date: p.post.pub_date,
            author: p.author.into(),
            group: p.group.map(UserFacingGroup::from),
            image: p.post.image.as_deref().map(media::url),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UserFacingComment {
    pub id: i32,
    pub post_id: i32,
    pub text: String,
    pub created: DateTime<Utc>,
    pub author: UserFacingUser,
}

impl From<CommentWithAuthor> for UserFacingComment {
    fn from(c: CommentWithAuthor) -> Self {
        Self {
            id: c.comment.id,
            post_id: c.comment.post_id,
            text: c.comment.text,
            created: c.comment.created,
            author: c.author.into(),
        }
    }
}

pub trait CoerceColl<T>
where
    Self: IntoIterator<Item = T>,
{
    fn coerce_into<U: From<T>>(self) -> Vec<U>;
}

impl<T> CoerceColl<T> for Vec<T> {
    fn coerce_into<U: From<T>>(self) -> Vec<U> {
        self.into_iter().map(|v| v.into()).collect()
    }
}

/// One page of the newest-first posts matching `filters`.
async fn paginate<DS: Datastore>(
    state: &State<DS>,
    filters: PostFilters,
    raw_page: Option<&str>,
) -> Fallible<Page<UserFacingPost>> {
    let count = state.ds.count_posts(filters.clone()).await?;
    let paginator = Paginator::new(count, state.posts_per_page);
    let number = paginator.page_number(raw_page);
    let posts = state
        .ds
        .list_posts(filters, paginator.window(number))
        .await?
        .coerce_into();
    Ok(paginator.page(number, posts))
}

/// Execute the closure, then log its operational metrics, e.g. time taken, whether it returned Ok/Err, etc.
async fn observe<F, Fut, R>(name: &'static str, f: F) -> Fallible<R>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Fallible<R>>,
{
    let start = Instant::now();
    let return_val = f().await;
    let duration = start.elapsed();
    metrics::HANDLER_SECS
        .with_label_values(&[name])
        .observe(duration.as_secs_f64());
    metrics::RESPONSES
        .with_label_values(&[name, variant_name(&return_val)])
        .inc();
    return_val
}

fn variant_name<T, E>(result: &Result<T, E>) -> &'static str {
    if result.is_ok() {
        "ok"
    } else {
        "err"
    }
}
