#[cfg(test)]
pub mod mock;
pub mod postfilters;
pub mod postgres;
pub mod structs;
pub mod tables;

use crate::twoface::Fallible;
use async_trait::async_trait;
use postfilters::{PostFilters, Window};
use structs::{
    Comment, CommentWithAuthor, Follow, Group, NewComment, NewGroup, NewPost, NewUser, Post,
    PostEdit, PostWithRefs, User,
};

#[async_trait]
/// The interface for storing users, groups, posts, comments and follows.
pub trait Datastore: Send + Sync + 'static {
    // Users
    /// Fails with `UserConflict` if the username is taken.
    async fn new_user(&self, new_user: NewUser) -> Fallible<User>;
    async fn get_user(&self, user_id: i32) -> Fallible<Option<User>>;
    async fn find_user(&self, username: &str) -> Fallible<Option<User>>;
    /// Every user whose email matches, ignoring case. Emails aren't unique.
    async fn find_users_by_email(&self, email: &str) -> Fallible<Vec<User>>;
    async fn set_password_hash(&self, user_id: i32, password_hash: String) -> Fallible<()>;

    // Groups
    /// Fails with `UserConflict` if the slug is taken.
    async fn new_group(&self, new_group: NewGroup) -> Fallible<Group>;
    /// All groups, ordered by title. Optionally only those whose title contains the substring.
    async fn list_groups(&self, title_contains: Option<String>) -> Fallible<Vec<Group>>;
    async fn find_group(&self, slug: &str) -> Fallible<Option<Group>>;
    /// Posts in the group keep existing without a group.
    async fn delete_group(&self, slug: &str) -> Fallible<Option<Group>>;

    // Posts
    async fn new_post(&self, new_post: NewPost) -> Fallible<Post>;
    async fn count_posts(&self, filters: PostFilters) -> Fallible<i64>;
    /// Newest first.
    async fn list_posts(&self, filters: PostFilters, window: Window)
        -> Fallible<Vec<PostWithRefs>>;
    async fn find_post(&self, post_id: i32) -> Fallible<Option<PostWithRefs>>;
    async fn edit_post(&self, post_id: i32, edit: PostEdit) -> Fallible<Option<Post>>;
    async fn set_post_group(&self, post_id: i32, group_id: Option<i32>)
        -> Fallible<Option<Post>>;
    /// The post's comments are deleted with it.
    async fn delete_post(&self, post_id: i32) -> Fallible<Option<Post>>;

    // Comments
    async fn new_comment(&self, new_comment: NewComment) -> Fallible<Comment>;
    /// Newest first.
    async fn list_comments(&self, post_id: i32) -> Fallible<Vec<CommentWithAuthor>>;
    /// Newest first, across all posts.
    async fn search_comments(
        &self,
        text_contains: Option<String>,
        limit: i64,
    ) -> Fallible<Vec<Comment>>;
    async fn delete_comment(&self, comment_id: i32) -> Fallible<Option<Comment>>;

    // Follows
    /// Get-or-create. Returns true if a new follow was stored. Fails with `UserActionInvalid`
    /// when `user_id == author_id`.
    async fn follow(&self, user_id: i32, author_id: i32) -> Fallible<bool>;
    /// Returns true if a follow was removed.
    async fn unfollow(&self, user_id: i32, author_id: i32) -> Fallible<bool>;
    async fn is_following(&self, user_id: i32, author_id: i32) -> Fallible<bool>;
    /// IDs of every author that `user_id` follows.
    async fn followed_authors(&self, user_id: i32) -> Fallible<Vec<i32>>;
    async fn list_follows(&self) -> Fallible<Vec<Follow>>;
}

/// Shared by every implementation so the error users see doesn't depend on the backend.
pub fn self_follow_error() -> crate::twoface::TfError {
    crate::twoface::TfError::reject(
        crate::twoface::Cause::UserActionInvalid,
        "You can't follow yourself",
    )
}
