//! The site's pages: post listings, post detail, and the forms that create posts, comments and
//! follows. For every business-logic struct in `datastore`, the bodies here use the matching
//! `UserFacing*` struct, which leaves out private fields.
use crate::api::{
    auth::{LoggedIn, Viewer},
    forms::{CommentForm, PostForm},
    media,
    observe, paginate,
    paginator::{Page, PageQuery},
    see_other, urls, CoerceColl, State, UserFacingComment, UserFacingGroup, UserFacingPost,
    UserFacingUser,
};
use crate::datastore::{
    postfilters::PostFilters,
    structs::{CommentWithAuthor, NewComment, NewPost, PostEdit},
    Datastore,
};
use crate::twoface::{Cause, Fallible, OrNotFound, TfError};
use actix_web::{http::header, web, HttpResponse};
use bytes::Bytes;
use chrono::offset::Utc;
use serde::Serialize;
use tracing::{debug, info};

pub fn configure<DS: Datastore>(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index::<DS>))
        .route("/group/{slug}/", web::get().to(group_posts::<DS>))
        .route("/profile/{username}/", web::get().to(profile::<DS>))
        .route(
            "/profile/{username}/follow/",
            web::post().to(profile_follow::<DS>),
        )
        .route(
            "/profile/{username}/unfollow/",
            web::post().to(profile_unfollow::<DS>),
        )
        .route("/posts/{post_id}/", web::get().to(post_detail::<DS>))
        .service(
            web::resource("/posts/{post_id}/edit/")
                .route(web::get().to(post_edit_form::<DS>))
                .route(web::post().to(post_edit::<DS>)),
        )
        .route("/posts/{post_id}/comment/", web::post().to(add_comment::<DS>))
        .service(
            web::resource("/create/")
                .route(web::get().to(post_create_form::<DS>))
                .route(web::post().to(post_create::<DS>)),
        )
        .route("/follow/", web::get().to(follow_index::<DS>));
}

#[derive(Serialize)]
struct IndexPage {
    page_obj: Page<UserFacingPost>,
}

#[derive(Serialize)]
struct GroupPage {
    group: UserFacingGroup,
    page_obj: Page<UserFacingPost>,
}

#[derive(Serialize)]
struct ProfilePage {
    author: UserFacingUser,
    post_count: i64,
    /// Only known for logged-in viewers
    #[serde(skip_serializing_if = "Option::is_none")]
    following: Option<bool>,
    page_obj: Page<UserFacingPost>,
}

#[derive(Serialize)]
struct CommentFormPage {
    action: String,
    fields: &'static [&'static str],
}

#[derive(Serialize)]
struct PostDetailPage {
    post: UserFacingPost,
    /// How many posts the post's author has written
    post_count: i64,
    form: CommentFormPage,
    comments: Vec<UserFacingComment>,
}

/// What the create/edit form needs to render: its labels, the current values and the groups
/// that can be chosen.
#[derive(Serialize)]
struct PostFormPage {
    title: &'static str,
    btn_text: &'static str,
    is_edit: bool,
    action: String,
    text: String,
    group: Option<String>,
    image: Option<String>,
    groups: Vec<UserFacingGroup>,
}

#[derive(Serialize)]
struct FollowBody {
    author: String,
    following: bool,
}

fn json_bytes(body: Bytes) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("application/json")
        .body(body)
}

/// Every post, newest first. Rendered pages are cached for a short while.
async fn index<DS: Datastore>(
    state: web::Data<State<DS>>,
    query: web::Query<PageQuery>,
) -> Fallible<HttpResponse> {
    observe("index", || async {
        let key = query.raw().unwrap_or_default().to_owned();
        if let Some(body) = state.index_cache.get(&key) {
            debug!(page = &key[..], "serving index from cache");
            return Ok(json_bytes(body));
        }
        let page = IndexPage {
            page_obj: paginate(state.get_ref(), PostFilters::default(), query.raw()).await?,
        };
        let body = Bytes::from(serde_json::to_vec(&page)?);
        state.index_cache.put(key, body.clone());
        Ok(json_bytes(body))
    })
    .await
}

async fn group_posts<DS: Datastore>(
    state: web::Data<State<DS>>,
    slug: web::Path<String>,
    query: web::Query<PageQuery>,
) -> Fallible<web::Json<GroupPage>> {
    observe("group_posts", || async {
        let group = state
            .ds
            .find_group(&slug)
            .await?
            .or_not_found("Group not found")?;
        let page_obj =
            paginate(state.get_ref(), PostFilters::in_group(group.id), query.raw()).await?;
        Ok(web::Json(GroupPage {
            group: group.into(),
            page_obj,
        }))
    })
    .await
}

async fn profile<DS: Datastore>(
    state: web::Data<State<DS>>,
    username: web::Path<String>,
    query: web::Query<PageQuery>,
    viewer: Viewer,
) -> Fallible<web::Json<ProfilePage>> {
    observe("profile", || async {
        let author = state
            .ds
            .find_user(&username)
            .await?
            .or_not_found("User not found")?;
        let page_obj =
            paginate(state.get_ref(), PostFilters::by_author(author.id), query.raw()).await?;
        let following = match viewer.user_id() {
            Some(viewer_id) => Some(state.ds.is_following(viewer_id, author.id).await?),
            None => None,
        };
        Ok(web::Json(ProfilePage {
            author: author.into(),
            post_count: page_obj.count,
            following,
            page_obj,
        }))
    })
    .await
}

async fn post_detail<DS: Datastore>(
    state: web::Data<State<DS>>,
    post_id: web::Path<i32>,
) -> Fallible<web::Json<PostDetailPage>> {
    observe("post_detail", || async {
        let post = state
            .ds
            .find_post(*post_id)
            .await?
            .or_not_found("Post not found")?;
        let post_count = state
            .ds
            .count_posts(PostFilters::by_author(post.author.id))
            .await?;
        let comments = state.ds.list_comments(post.post.id).await?.coerce_into();
        Ok(web::Json(PostDetailPage {
            form: CommentFormPage {
                action: urls::add_comment(post.post.id),
                fields: &["text"],
            },
            post: post.into(),
            post_count,
            comments,
        }))
    })
    .await
}

/// Look up the chosen group. An unknown slug is a form error, not a 404.
async fn resolve_group<DS: Datastore>(
    state: &State<DS>,
    slug: Option<&str>,
) -> Fallible<Option<i32>> {
    guard!(let Some(slug) = slug else {
        return Ok(None);
    });
    match state.ds.find_group(slug).await? {
        Some(group) => Ok(Some(group.id)),
        None => Err(TfError::reject(
            Cause::UserInvalidField,
            "Select a valid choice. That group is not one of the available choices",
        )),
    }
}

async fn post_create_form<DS: Datastore>(
    state: web::Data<State<DS>>,
    _viewer: LoggedIn,
) -> Fallible<web::Json<PostFormPage>> {
    observe("post_create_form", || async {
        let groups = state.ds.list_groups(None).await?.coerce_into();
        Ok(web::Json(PostFormPage {
            title: "New post",
            btn_text: "Add",
            is_edit: false,
            action: "/create/".to_owned(),
            text: String::new(),
            group: None,
            image: None,
            groups,
        }))
    })
    .await
}

async fn post_create<DS: Datastore>(
    state: web::Data<State<DS>>,
    viewer: LoggedIn,
    form: web::Json<PostForm>,
) -> Fallible<HttpResponse> {
    observe("post_create", || async {
        form.check()?;
        let group_id = resolve_group(state.get_ref(), form.group_slug()).await?;
        let image = match &form.image {
            Some(upload) => Some(state.media.check(upload).await?),
            None => None,
        };
        let post = state
            .ds
            .new_post(NewPost {
                text: form.text.clone(),
                pub_date: Utc::now(),
                author_id: viewer.0.sub,
                group_id,
                image: image.as_ref().map(|i| i.stored_path.clone()),
            })
            .await?;
        if let Some(image) = image {
            if let Err(e) = state.media.store(image).await {
                state.ds.delete_post(post.id).await?;
                return Err(e);
            }
        }
        info!(post_id = post.id, author = &viewer.0.username[..], headline = %post, "created post");
        let created = state
            .ds
            .find_post(post.id)
            .await?
            .or_not_found("Post not found")?;
        Ok(HttpResponse::Created()
            .header(header::LOCATION, urls::profile(&viewer.0.username))
            .json(UserFacingPost::from(created)))
    })
    .await
}

/// Only the author gets the form. Everyone else is sent back to the post.
async fn post_edit_form<DS: Datastore>(
    state: web::Data<State<DS>>,
    post_id: web::Path<i32>,
    viewer: Viewer,
) -> Fallible<HttpResponse> {
    observe("post_edit_form", || async {
        let post = state
            .ds
            .find_post(*post_id)
            .await?
            .or_not_found("Post not found")?;
        if viewer.user_id() != Some(post.post.author_id) {
            return Ok(see_other(urls::post_detail(post.post.id)));
        }
        let groups = state.ds.list_groups(None).await?.coerce_into();
        Ok(HttpResponse::Ok().json(PostFormPage {
            title: "Edit post",
            btn_text: "Save",
            is_edit: true,
            action: urls::post_edit(post.post.id),
            text: post.post.text,
            group: post.group.map(|g| g.slug),
            image: post.post.image.as_deref().map(media::url),
            groups,
        }))
    })
    .await
}

async fn post_edit<DS: Datastore>(
    state: web::Data<State<DS>>,
    post_id: web::Path<i32>,
    viewer: Viewer,
    form: web::Json<PostForm>,
) -> Fallible<HttpResponse> {
    observe("post_edit", || async {
        let existing = state
            .ds
            .find_post(*post_id)
            .await?
            .or_not_found("Post not found")?;
        let post_id = existing.post.id;
        if viewer.user_id() != Some(existing.post.author_id) {
            return Ok(see_other(urls::post_detail(post_id)));
        }
        form.check()?;
        let group_id = resolve_group(state.get_ref(), form.group_slug()).await?;
        let upload = match &form.image {
            Some(upload) => Some(state.media.check(upload).await?),
            None => None,
        };
        let image = match &upload {
            Some(checked) => Some(checked.stored_path.clone()),
            None if form.clear_image => None,
            None => existing.post.image,
        };
        state
            .ds
            .edit_post(
                post_id,
                PostEdit {
                    text: form.text.clone(),
                    pub_date: Utc::now(),
                    group_id,
                    image,
                },
            )
            .await?
            .or_not_found("Post not found")?;
        if let Some(checked) = upload {
            state.media.store(checked).await?;
        }
        info!(post_id, "edited post");
        let edited = state
            .ds
            .find_post(post_id)
            .await?
            .or_not_found("Post not found")?;
        Ok(HttpResponse::Ok()
            .header(header::LOCATION, urls::post_detail(post_id))
            .json(UserFacingPost::from(edited)))
    })
    .await
}

async fn add_comment<DS: Datastore>(
    state: web::Data<State<DS>>,
    post_id: web::Path<i32>,
    viewer: LoggedIn,
    form: web::Json<CommentForm>,
) -> Fallible<HttpResponse> {
    observe("add_comment", || async {
        let post = state
            .ds
            .find_post(*post_id)
            .await?
            .or_not_found("Post not found")?;
        form.check()?;
        let comment = state
            .ds
            .new_comment(NewComment {
                post_id: post.post.id,
                author_id: viewer.0.sub,
                text: form.text.clone(),
                created: Utc::now(),
            })
            .await?;
        info!(post_id = post.post.id, comment_id = comment.id, "added comment");
        let author = state
            .ds
            .get_user(viewer.0.sub)
            .await?
            .or_not_found("User not found")?;
        let body = UserFacingComment::from(CommentWithAuthor {
            comment,
            author,
        });
        Ok(HttpResponse::Created()
            .header(header::LOCATION, urls::post_detail(post.post.id))
            .json(body))
    })
    .await
}

/// Posts by every author the viewer follows.
async fn follow_index<DS: Datastore>(
    state: web::Data<State<DS>>,
    viewer: LoggedIn,
    query: web::Query<PageQuery>,
) -> Fallible<web::Json<IndexPage>> {
    observe("follow_index", || async {
        let authors = state.ds.followed_authors(viewer.0.sub).await?;
        let page_obj =
            paginate(state.get_ref(), PostFilters::by_any_author(authors), query.raw()).await?;
        Ok(web::Json(IndexPage { page_obj }))
    })
    .await
}

async fn profile_follow<DS: Datastore>(
    state: web::Data<State<DS>>,
    username: web::Path<String>,
    viewer: LoggedIn,
) -> Fallible<HttpResponse> {
    observe("profile_follow", || async {
        let author = state
            .ds
            .find_user(&username)
            .await?
            .or_not_found("User not found")?;
        if state.ds.follow(viewer.0.sub, author.id).await? {
            info!(user = &viewer.0.username[..], author = %author, "followed author");
        }
        Ok(HttpResponse::Ok()
            .header(header::LOCATION, urls::profile(&author.username))
            .json(FollowBody {
                author: author.username,
                following: true,
            }))
    })
    .await
}

async fn profile_unfollow<DS: Datastore>(
    state: web::Data<State<DS>>,
    username: web::Path<String>,
    viewer: LoggedIn,
) -> Fallible<HttpResponse> {
    observe("profile_unfollow", || async {
        let author = state
            .ds
            .find_user(&username)
            .await?
            .or_not_found("User not found")?;
        if state.ds.unfollow(viewer.0.sub, author.id).await? {
            info!(user = &viewer.0.username[..], author = %author, "unfollowed author");
        }
        Ok(HttpResponse::Ok()
            .header(header::LOCATION, urls::profile(&author.username))
            .json(FollowBody {
                author: author.username,
                following: false,
            }))
    })
    .await
}

#[cfg(test)]
mod tests {
    use crate::api::{media::tests::gif_upload, testing};
    use crate::datastore::{postfilters::PostFilters, structs::NewPost, Datastore};
    use chrono::offset::Utc;
    use actix_web::{
        http::{header, StatusCode},
        test,
    };
    use serde_json::{json, Value};

    fn location(resp: &actix_web::dev::ServiceResponse) -> &str {
        resp.headers()
            .get(header::LOCATION)
            .unwrap()
            .to_str()
            .unwrap()
    }

    #[actix_rt::test]
    async fn test_index_paginates_newest_first() {
        let st = testing::state();
        let leo = st.user("leo").await;
        for i in 0..15 {
            st.post(&leo, None, &format!("post number {}", i)).await;
        }
        let mut app = test_app!(st);

        let req = test::TestRequest::get().uri("/").to_request();
        let body: Value = test::read_body_json(test::call_service(&mut app, req).await).await;
        let page = &body["page_obj"];
        assert_eq!(page["object_list"].as_array().unwrap().len(), 10);
        assert_eq!(page["object_list"][0]["text"], "post number 14");
        assert_eq!(page["num_pages"], 2);
        assert_eq!(page["has_next"], true);

        let req = test::TestRequest::get().uri("/?page=2").to_request();
        let body: Value = test::read_body_json(test::call_service(&mut app, req).await).await;
        assert_eq!(body["page_obj"]["object_list"].as_array().unwrap().len(), 5);
        assert_eq!(body["page_obj"]["has_previous"], true);

        // Past the end falls back to the last page.
        let req = test::TestRequest::get().uri("/?page=99").to_request();
        let body: Value = test::read_body_json(test::call_service(&mut app, req).await).await;
        assert_eq!(body["page_obj"]["number"], 2);
    }

    #[actix_rt::test]
    async fn test_index_is_cached_until_cleared() {
        let st = testing::state();
        let leo = st.user("leo").await;
        st.post(&leo, None, "first").await;
        let mut app = test_app!(st);

        let req = test::TestRequest::get().uri("/").to_request();
        let before = test::read_body(test::call_service(&mut app, req).await).await;

        st.post(&leo, None, "second").await;
        let req = test::TestRequest::get().uri("/").to_request();
        let cached = test::read_body(test::call_service(&mut app, req).await).await;
        assert_eq!(before, cached);

        st.index_cache.clear();
        let req = test::TestRequest::get().uri("/").to_request();
        let body: Value = test::read_body_json(test::call_service(&mut app, req).await).await;
        assert_eq!(body["page_obj"]["count"], 2);
        assert_eq!(body["page_obj"]["object_list"][0]["text"], "second");
    }

    #[actix_rt::test]
    async fn test_group_page_lists_only_its_posts() {
        let st = testing::state();
        let leo = st.user("leo").await;
        let cats = st.group("Cats", "cats").await;
        st.post(&leo, Some(&cats), "meow").await;
        st.post(&leo, None, "no group").await;
        let mut app = test_app!(st);

        let req = test::TestRequest::get().uri("/group/cats/").to_request();
        let resp = test::call_service(&mut app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["group"]["title"], "Cats");
        assert_eq!(body["page_obj"]["count"], 1);
        assert_eq!(body["page_obj"]["object_list"][0]["group"]["slug"], "cats");

        let req = test::TestRequest::get().uri("/group/dogs/").to_request();
        let resp = test::call_service(&mut app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_rt::test]
    async fn test_profile_following_only_for_logged_in() {
        let st = testing::state();
        let leo = st.user("leo").await;
        let ann = st.user("ann").await;
        st.post(&leo, None, "hello").await;
        let mut app = test_app!(st);

        let req = test::TestRequest::get().uri("/profile/leo/").to_request();
        let body: Value = test::read_body_json(test::call_service(&mut app, req).await).await;
        assert_eq!(body["author"]["username"], "leo");
        assert_eq!(body["post_count"], 1);
        assert!(body.get("following").is_none());

        let req = test::TestRequest::get()
            .uri("/profile/leo/")
            .header(header::AUTHORIZATION, st.bearer(&ann))
            .to_request();
        let body: Value = test::read_body_json(test::call_service(&mut app, req).await).await;
        assert_eq!(body["following"], false);

        st.ds.follow(ann.id, leo.id).await.unwrap();
        let req = test::TestRequest::get()
            .uri("/profile/leo/")
            .header(header::AUTHORIZATION, st.bearer(&ann))
            .to_request();
        let body: Value = test::read_body_json(test::call_service(&mut app, req).await).await;
        assert_eq!(body["following"], true);

        let req = test::TestRequest::get().uri("/profile/nobody/").to_request();
        let resp = test::call_service(&mut app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_rt::test]
    async fn test_bad_token_is_a_guest_on_public_pages() {
        let st = testing::state();
        st.user("leo").await;
        let mut app = test_app!(st);

        let req = test::TestRequest::get()
            .uri("/profile/leo/")
            .header(header::AUTHORIZATION, "Bearer garbage")
            .to_request();
        let resp = test::call_service(&mut app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert!(body.get("following").is_none());
    }

    #[actix_rt::test]
    async fn test_post_detail() {
        let st = testing::state();
        let leo = st.user("leo").await;
        st.post(&leo, None, "older").await;
        let post = st.post(&leo, None, "the one").await;
        let mut app = test_app!(st);

        let req = test::TestRequest::get()
            .uri(&format!("/posts/{}/", post.id))
            .to_request();
        let resp = test::call_service(&mut app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["post"]["text"], "the one");
        assert_eq!(body["post_count"], 2);
        assert_eq!(body["form"]["action"], format!("/posts/{}/comment/", post.id));
        assert_eq!(body["comments"], json!([]));

        let req = test::TestRequest::get().uri("/posts/999/").to_request();
        let resp = test::call_service(&mut app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_rt::test]
    async fn test_create_requires_login() {
        let st = testing::state();
        let mut app = test_app!(st);

        let req = test::TestRequest::get().uri("/create/").to_request();
        let resp = test::call_service(&mut app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::post()
            .uri("/create/")
            .set_json(&json!({"text": "sneaky"}))
            .to_request();
        let resp = test::call_service(&mut app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(st.ds.count_posts(PostFilters::default()).await.unwrap(), 0);
    }

    #[actix_rt::test]
    async fn test_create_form_lists_groups() {
        let st = testing::state();
        let leo = st.user("leo").await;
        st.group("Cats", "cats").await;
        let mut app = test_app!(st);

        let req = test::TestRequest::get()
            .uri("/create/")
            .header(header::AUTHORIZATION, st.bearer(&leo))
            .to_request();
        let body: Value = test::read_body_json(test::call_service(&mut app, req).await).await;
        assert_eq!(body["is_edit"], false);
        assert_eq!(body["btn_text"], "Add");
        assert_eq!(body["groups"][0]["slug"], "cats");
    }

    #[actix_rt::test]
    async fn test_create_post_with_group_and_image() {
        let st = testing::state();
        let leo = st.user("leo").await;
        st.group("Cats", "cats").await;
        let mut app = test_app!(st);

        let req = test::TestRequest::post()
            .uri("/create/")
            .header(header::AUTHORIZATION, st.bearer(&leo))
            .set_json(&json!({"text": "look at this", "group": "cats", "image": gif_upload()}))
            .to_request();
        let resp = test::call_service(&mut app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(location(&resp), "/profile/leo/");
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["group"]["slug"], "cats");
        let image = body["image"].as_str().unwrap().to_owned();
        assert!(image.starts_with("/media/posts/"));
        assert!(image.ends_with(".gif"));

        let req = test::TestRequest::get().uri(&image).to_request();
        let resp = test::call_service(&mut app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get(header::CONTENT_TYPE).unwrap(), "image/gif");
    }

    #[actix_rt::test]
    async fn test_create_post_rejects_bad_forms() {
        let st = testing::state();
        let leo = st.user("leo").await;
        let mut app = test_app!(st);

        let bad_forms = vec![
            json!({"text": "   "}),
            json!({"text": "fine", "group": "no-such-group"}),
            json!({
                "text": "fine",
                "image": {"name": "notes.txt", "content": base64::encode("not an image")}
            }),
            json!({
                "text": "fine",
                "image": {"name": "broken.gif", "content": base64::encode("GIF89a broken")}
            }),
        ];
        for form in bad_forms {
            let req = test::TestRequest::post()
                .uri("/create/")
                .header(header::AUTHORIZATION, st.bearer(&leo))
                .set_json(&form)
                .to_request();
            let resp = test::call_service(&mut app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{}", form);
        }
        assert_eq!(st.ds.count_posts(PostFilters::default()).await.unwrap(), 0);
    }

    #[actix_rt::test]
    async fn test_author_edits_post() {
        let st = testing::state();
        let leo = st.user("leo").await;
        let cats = st.group("Cats", "cats").await;
        let post = st
            .ds
            .new_post(NewPost {
                text: "typo".to_owned(),
                pub_date: Utc::now() - chrono::Duration::days(1),
                author_id: leo.id,
                group_id: Some(cats.id),
                image: None,
            })
            .await
            .unwrap();
        let mut app = test_app!(st);
        let uri = format!("/posts/{}/edit/", post.id);

        let req = test::TestRequest::get()
            .uri(&uri)
            .header(header::AUTHORIZATION, st.bearer(&leo))
            .to_request();
        let body: Value = test::read_body_json(test::call_service(&mut app, req).await).await;
        assert_eq!(body["is_edit"], true);
        assert_eq!(body["text"], "typo");
        assert_eq!(body["group"], "cats");

        let before_edit = Utc::now();
        let req = test::TestRequest::post()
            .uri(&uri)
            .header(header::AUTHORIZATION, st.bearer(&leo))
            .set_json(&json!({"text": "fixed"}))
            .to_request();
        let resp = test::call_service(&mut app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(location(&resp), format!("/posts/{}/", post.id));

        let edited = st.ds.find_post(post.id).await.unwrap().unwrap();
        assert_eq!(edited.post.text, "fixed");
        assert!(edited.group.is_none());
        assert!(edited.post.pub_date >= before_edit);
        assert!(edited.post.pub_date <= Utc::now());
    }

    #[actix_rt::test]
    async fn test_edit_keeps_or_clears_image() {
        let st = testing::state();
        let leo = st.user("leo").await;
        let mut app = test_app!(st);

        let req = test::TestRequest::post()
            .uri("/create/")
            .header(header::AUTHORIZATION, st.bearer(&leo))
            .set_json(&json!({"text": "pic", "image": gif_upload()}))
            .to_request();
        let body: Value = test::read_body_json(test::call_service(&mut app, req).await).await;
        let post_id = body["id"].as_i64().unwrap();
        let uri = format!("/posts/{}/edit/", post_id);

        let req = test::TestRequest::post()
            .uri(&uri)
            .header(header::AUTHORIZATION, st.bearer(&leo))
            .set_json(&json!({"text": "pic, again"}))
            .to_request();
        let body: Value = test::read_body_json(test::call_service(&mut app, req).await).await;
        assert!(body["image"].is_string());

        let req = test::TestRequest::post()
            .uri(&uri)
            .header(header::AUTHORIZATION, st.bearer(&leo))
            .set_json(&json!({"text": "no pic", "clear_image": true}))
            .to_request();
        let body: Value = test::read_body_json(test::call_service(&mut app, req).await).await;
        assert!(body["image"].is_null());
    }

    #[actix_rt::test]
    async fn test_non_author_is_sent_to_the_post() {
        let st = testing::state();
        let leo = st.user("leo").await;
        let ann = st.user("ann").await;
        let post = st.post(&leo, None, "mine").await;
        let mut app = test_app!(st);
        let uri = format!("/posts/{}/edit/", post.id);

        let req = test::TestRequest::post()
            .uri(&uri)
            .header(header::AUTHORIZATION, st.bearer(&ann))
            .set_json(&json!({"text": "yours now"}))
            .to_request();
        let resp = test::call_service(&mut app, req).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&resp), format!("/posts/{}/", post.id));

        let req = test::TestRequest::get().uri(&uri).to_request();
        let resp = test::call_service(&mut app, req).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);

        let unchanged = st.ds.find_post(post.id).await.unwrap().unwrap();
        assert_eq!(unchanged.post.text, "mine");
    }

    #[actix_rt::test]
    async fn test_add_comment() {
        let st = testing::state();
        let leo = st.user("leo").await;
        let ann = st.user("ann").await;
        let post = st.post(&leo, None, "discuss").await;
        let mut app = test_app!(st);
        let uri = format!("/posts/{}/comment/", post.id);

        let req = test::TestRequest::post()
            .uri(&uri)
            .set_json(&json!({"text": "guest comment"}))
            .to_request();
        let resp = test::call_service(&mut app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::post()
            .uri(&uri)
            .header(header::AUTHORIZATION, st.bearer(&ann))
            .set_json(&json!({"text": ""}))
            .to_request();
        let resp = test::call_service(&mut app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post()
            .uri(&uri)
            .header(header::AUTHORIZATION, st.bearer(&ann))
            .set_json(&json!({"text": "nice post"}))
            .to_request();
        let resp = test::call_service(&mut app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(location(&resp), format!("/posts/{}/", post.id));

        let req = test::TestRequest::get()
            .uri(&format!("/posts/{}/", post.id))
            .to_request();
        let body: Value = test::read_body_json(test::call_service(&mut app, req).await).await;
        assert_eq!(body["comments"][0]["text"], "nice post");
        assert_eq!(body["comments"][0]["author"]["username"], "ann");

        let req = test::TestRequest::post()
            .uri("/posts/999/comment/")
            .header(header::AUTHORIZATION, st.bearer(&ann))
            .set_json(&json!({"text": "into the void"}))
            .to_request();
        let resp = test::call_service(&mut app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_rt::test]
    async fn test_follow_and_unfollow() {
        let st = testing::state();
        let leo = st.user("leo").await;
        let ann = st.user("ann").await;
        let mut app = test_app!(st);

        for _ in 0..2 {
            let req = test::TestRequest::post()
                .uri("/profile/leo/follow/")
                .header(header::AUTHORIZATION, st.bearer(&ann))
                .to_request();
            let resp = test::call_service(&mut app, req).await;
            assert_eq!(resp.status(), StatusCode::OK);
            assert_eq!(location(&resp), "/profile/leo/");
        }
        assert!(st.ds.is_following(ann.id, leo.id).await.unwrap());
        assert_eq!(st.ds.list_follows().await.unwrap().len(), 1);

        let req = test::TestRequest::post()
            .uri("/profile/leo/unfollow/")
            .header(header::AUTHORIZATION, st.bearer(&ann))
            .to_request();
        let body: Value = test::read_body_json(test::call_service(&mut app, req).await).await;
        assert_eq!(body["following"], false);
        assert!(!st.ds.is_following(ann.id, leo.id).await.unwrap());
    }

    #[actix_rt::test]
    async fn test_follow_rejections() {
        let st = testing::state();
        let leo = st.user("leo").await;
        let mut app = test_app!(st);

        let req = test::TestRequest::post()
            .uri("/profile/leo/follow/")
            .header(header::AUTHORIZATION, st.bearer(&leo))
            .to_request();
        let resp = test::call_service(&mut app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post()
            .uri("/profile/nobody/follow/")
            .header(header::AUTHORIZATION, st.bearer(&leo))
            .to_request();
        let resp = test::call_service(&mut app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::post()
            .uri("/profile/leo/follow/")
            .to_request();
        let resp = test::call_service(&mut app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_rt::test]
    async fn test_follow_index_shows_followed_authors() {
        let st = testing::state();
        let leo = st.user("leo").await;
        let ann = st.user("ann").await;
        let bob = st.user("bob").await;
        st.post(&leo, None, "by leo").await;
        st.post(&bob, None, "by bob").await;
        let mut app = test_app!(st);

        let req = test::TestRequest::get()
            .uri("/follow/")
            .header(header::AUTHORIZATION, st.bearer(&ann))
            .to_request();
        let body: Value = test::read_body_json(test::call_service(&mut app, req).await).await;
        assert_eq!(body["page_obj"]["count"], 0);
        assert_eq!(body["page_obj"]["num_pages"], 1);

        st.ds.follow(ann.id, leo.id).await.unwrap();
        let req = test::TestRequest::get()
            .uri("/follow/")
            .header(header::AUTHORIZATION, st.bearer(&ann))
            .to_request();
        let body: Value = test::read_body_json(test::call_service(&mut app, req).await).await;
        assert_eq!(body["page_obj"]["count"], 1);
        assert_eq!(body["page_obj"]["object_list"][0]["text"], "by leo");

        // Bob follows nobody, so Leo's post isn't in his feed.
        let req = test::TestRequest::get()
            .uri("/follow/")
            .header(header::AUTHORIZATION, st.bearer(&bob))
            .to_request();
        let body: Value = test::read_body_json(test::call_service(&mut app, req).await).await;
        assert_eq!(body["page_obj"]["count"], 0);
    }

    #[actix_rt::test]
    async fn test_unknown_route_is_404() {
        let st = testing::state();
        let mut app = test_app!(st);
        let req = test::TestRequest::get().uri("/no/such/page/").to_request();
        let resp = test::call_service(&mut app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: Value = test::read_body_json(resp).await;
        assert!(body["error"].as_str().unwrap().contains("Page not found"));
    }

    #[actix_rt::test]
    async fn test_comments_are_newest_first() {
        let st = testing::state();
        let leo = st.user("leo").await;
        let ann = st.user("ann").await;
        let post = st.post(&leo, None, "discuss").await;
        let mut app = test_app!(st);

        for text in &["first!", "second"] {
            let req = test::TestRequest::post()
                .uri(&format!("/posts/{}/comment/", post.id))
                .header(header::AUTHORIZATION, st.bearer(&ann))
                .set_json(&json!({ "text": text }))
                .to_request();
            let resp = test::call_service(&mut app, req).await;
            assert_eq!(resp.status(), StatusCode::CREATED);
        }

        let req = test::TestRequest::get()
            .uri(&format!("/posts/{}/", post.id))
            .to_request();
        let body: Value = test::read_body_json(test::call_service(&mut app, req).await).await;
        let texts: Vec<_> = body["comments"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["text"].as_str().unwrap())
            .collect();
        assert_eq!(texts, vec!["second", "first!"]);
    }

    #[actix_rt::test]
    async fn test_extractor_failures_are_json_errors() {
        let st = testing::state();
        let leo = st.user("leo").await;
        let post = st.post(&leo, None, "discuss").await;
        let mut app = test_app!(st);

        let req = test::TestRequest::post()
            .uri(&format!("/posts/{}/comment/", post.id))
            .header(header::AUTHORIZATION, st.bearer(&leo))
            .header(header::CONTENT_TYPE, "application/json")
            .set_payload("{not json")
            .to_request();
        let resp = test::call_service(&mut app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "UserInvalidField: Request body is not a valid form");

        let req = test::TestRequest::post()
            .uri("/create/")
            .header(header::AUTHORIZATION, st.bearer(&leo))
            .header(header::CONTENT_TYPE, "text/plain")
            .set_payload(r#"{"text": "hi"}"#)
            .to_request();
        let resp = test::call_service(&mut app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "UserInvalidField: Request body must be JSON");

        let req = test::TestRequest::get().uri("/posts/abc/").to_request();
        let resp = test::call_service(&mut app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "NotFound: Page not found");

        let req = test::TestRequest::get()
            .uri("/admin/posts?limit=lots")
            .to_request();
        let resp = test::call_service(&mut app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "UserInvalidField: Invalid query string");
    }

    #[actix_rt::test]
    async fn test_oversized_body_is_a_json_error() {
        let st = testing::state();
        let leo = st.user("leo").await;
        let mut app = test_app!(st);

        let req = test::TestRequest::post()
            .uri("/create/")
            .header(header::AUTHORIZATION, st.bearer(&leo))
            .set_json(&json!({ "text": "a".repeat(2 * 1024 * 1024) }))
            .to_request();
        let resp = test::call_service(&mut app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "UserInvalidField: Request body is too large");
        assert_eq!(st.ds.count_posts(PostFilters::default()).await.unwrap(), 0);
    }
}
