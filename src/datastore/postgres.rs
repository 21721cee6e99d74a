mod errors;
mod group_store;
mod post_store;
mod user_store;

use crate::config::Config;
use crate::datastore::{
    postfilters::{PostFilters, Window},
    structs::{
        Comment, CommentWithAuthor, Follow, Group, NewComment, NewGroup, NewPost, NewUser, Post,
        PostEdit, PostWithRefs, User,
    },
    Datastore,
};
use crate::twoface::{BlockingResp, Fallible};
use actix_web::web::block;
use async_trait::async_trait;
use diesel::{
    pg::PgConnection,
    r2d2::{ConnectionManager, Pool},
};
use prometheus::{
    core::{Collector, Desc},
    proto::MetricFamily,
    IntGauge, Opts,
};
use std::time::Duration;

pub struct Dsn {
    secret: String,
}

impl Dsn {
    pub fn new(config: &Config) -> Self {
        Dsn {
            secret: config.db_dsn.clone(),
        }
    }
}

impl From<Dsn> for String {
    fn from(dsn: Dsn) -> String {
        dsn.secret
    }
}

/// An implementation of datastore::Datastore backed by Postgres
#[derive(Clone)]
pub struct PostgresStore {
    pool: Pool<ConnectionManager<PgConnection>>,
    idle_conns: IntGauge,
    conns: IntGauge,
}

impl PostgresStore {
    pub fn new(
        dsn: Dsn,
        max_pool_size: u32,
        conn_timeout: Duration,
    ) -> Result<Self, anyhow::Error> {
        let manager = ConnectionManager::<PgConnection>::new(dsn);
        let pool = Pool::builder()
            .max_size(max_pool_size)
            .connection_timeout(conn_timeout)
            .build(manager)?;
        let idle_conns = IntGauge::with_opts(Opts::new(
            "yatube_db_connections_idle",
            "How many DB connections are currently idle",
        ))?;
        let conns = IntGauge::with_opts(Opts::new(
            "yatube_db_connections",
            "How many DB connections are open",
        ))?;
        Ok(Self {
            pool,
            idle_conns,
            conns,
        })
    }

    /// Check out a connection and run `f` on the blocking threadpool.
    async fn run<F, T>(&self, f: F) -> Fallible<T>
    where
        F: FnOnce(&PgConnection) -> Fallible<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        block(move || {
            let conn = pool.get()?;
            f(&conn)
        })
        .await
        .to_resp()
    }
}

impl Collector for PostgresStore {
    fn desc(&self) -> Vec<&Desc> {
        let mut descs = self.idle_conns.desc();
        descs.extend(self.conns.desc());
        descs
    }

    fn collect(&self) -> Vec<MetricFamily> {
        self.idle_conns
            .set(self.pool.state().idle_connections as i64);
        self.conns.set(self.pool.state().connections as i64);
        let mut metrics = self.idle_conns.collect();
        metrics.extend(self.conns.collect());
        metrics
    }
}

#[async_trait]
impl Datastore for PostgresStore {
    async fn new_user(&self, new_user: NewUser) -> Fallible<User> {
        self.run(move |conn| user_store::new_user(conn, &new_user))
            .await
    }

    async fn get_user(&self, user_id: i32) -> Fallible<Option<User>> {
        self.run(move |conn| user_store::get_user(conn, user_id))
            .await
    }

    async fn find_user(&self, username: &str) -> Fallible<Option<User>> {
        let username = username.to_owned();
        self.run(move |conn| user_store::find_user(conn, &username))
            .await
    }

    async fn find_users_by_email(&self, email: &str) -> Fallible<Vec<User>> {
        let email = email.to_owned();
        self.run(move |conn| user_store::find_users_by_email(conn, &email))
            .await
    }

    async fn set_password_hash(&self, user_id: i32, password_hash: String) -> Fallible<()> {
        self.run(move |conn| user_store::set_password_hash(conn, user_id, &password_hash))
            .await
    }

    async fn new_group(&self, new_group: NewGroup) -> Fallible<Group> {
        self.run(move |conn| group_store::new_group(conn, &new_group))
            .await
    }

    async fn list_groups(&self, title_contains: Option<String>) -> Fallible<Vec<Group>> {
        self.run(move |conn| group_store::list_groups(conn, title_contains.as_deref()))
            .await
    }

    async fn find_group(&self, slug: &str) -> Fallible<Option<Group>> {
        let slug = slug.to_owned();
        self.run(move |conn| group_store::find_group(conn, &slug))
            .await
    }

    async fn delete_group(&self, slug: &str) -> Fallible<Option<Group>> {
        let slug = slug.to_owned();
        self.run(move |conn| group_store::delete_group(conn, &slug))
            .await
    }

    async fn new_post(&self, new_post: NewPost) -> Fallible<Post> {
        self.run(move |conn| post_store::new_post(conn, &new_post))
            .await
    }

    async fn count_posts(&self, filters: PostFilters) -> Fallible<i64> {
        self.run(move |conn| post_store::count_posts(conn, &filters))
            .await
    }

    async fn list_posts(
        &self,
        filters: PostFilters,
        window: Window,
    ) -> Fallible<Vec<PostWithRefs>> {
        self.run(move |conn| post_store::list_posts(conn, &filters, window))
            .await
    }

    async fn find_post(&self, post_id: i32) -> Fallible<Option<PostWithRefs>> {
        self.run(move |conn| post_store::find_post(conn, post_id))
            .await
    }

    async fn edit_post(&self, post_id: i32, edit: PostEdit) -> Fallible<Option<Post>> {
        self.run(move |conn| post_store::edit_post(conn, post_id, &edit))
            .await
    }

    async fn set_post_group(
        &self,
        post_id: i32,
        group_id: Option<i32>,
    ) -> Fallible<Option<Post>> {
        self.run(move |conn| post_store::set_post_group(conn, post_id, group_id))
            .await
    }

    async fn delete_post(&self, post_id: i32) -> Fallible<Option<Post>> {
        self.run(move |conn| post_store::delete_post(conn, post_id))
            .await
    }

    async fn new_comment(&self, new_comment: NewComment) -> Fallible<Comment> {
        self.run(move |conn| post_store::new_comment(conn, &new_comment))
            .await
    }

    async fn list_comments(&self, post_id: i32) -> Fallible<Vec<CommentWithAuthor>> {
        self.run(move |conn| post_store::list_comments(conn, post_id))
            .await
    }

    async fn search_comments(
        &self,
        text_contains: Option<String>,
        limit: i64,
    ) -> Fallible<Vec<Comment>> {
        self.run(move |conn| post_store::search_comments(conn, text_contains.as_deref(), limit))
            .await
    }

    async fn delete_comment(&self, comment_id: i32) -> Fallible<Option<Comment>> {
        self.run(move |conn| post_store::delete_comment(conn, comment_id))
            .await
    }

    async fn follow(&self, user_id: i32, author_id: i32) -> Fallible<bool> {
        self.run(move |conn| user_store::follow(conn, user_id, author_id))
            .await
    }

    async fn unfollow(&self, user_id: i32, author_id: i32) -> Fallible<bool> {
        self.run(move |conn| user_store::unfollow(conn, user_id, author_id))
            .await
    }

    async fn is_following(&self, user_id: i32, author_id: i32) -> Fallible<bool> {
        self.run(move |conn| user_store::is_following(conn, user_id, author_id))
            .await
    }

    async fn followed_authors(&self, user_id: i32) -> Fallible<Vec<i32>> {
        self.run(move |conn| user_store::followed_authors(conn, user_id))
            .await
    }

    async fn list_follows(&self) -> Fallible<Vec<Follow>> {
        self.run(user_store::list_follows).await
    }
}
