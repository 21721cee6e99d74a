use crate::datastore::{
    postfilters::{PostFilters, Window},
    self_follow_error,
    structs::{
        Comment, CommentWithAuthor, Follow, Group, NewComment, NewGroup, NewPost, NewUser, Post,
        PostEdit, PostWithRefs, User,
    },
};
use crate::twoface::{ExternalError, Fallible, TfError};
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::offset::Utc;
use std::sync::{Arc, Mutex};

#[derive(Default, Debug)]
struct Tables {
    users: Vec<User>,
    groups: Vec<Group>,
    posts: Vec<Post>,
    comments: Vec<Comment>,
    follows: Vec<Follow>,
    next_id: i32,
}

impl Tables {
    // One sequence for every table is enough for tests, IDs only need to be unique per table.
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn with_refs(&self, post: &Post) -> PostWithRefs {
        PostWithRefs {
            post: post.clone(),
            author: self
                .users
                .iter()
                .find(|u| u.id == post.author_id)
                .cloned()
                .expect("post author must exist"),
            group: post
                .group_id
                .and_then(|id| self.groups.iter().find(|g| g.id == id).cloned()),
        }
    }

    /// Newest first, same as the SQL ordering.
    fn sorted_posts(&self, filters: &PostFilters) -> Vec<&Post> {
        let mut posts: Vec<_> = self.posts.iter().filter(|p| p.matches(filters)).collect();
        posts.sort_by(|a, b| b.pub_date.cmp(&a.pub_date).then(b.id.cmp(&a.id)));
        posts
    }
}

fn conflict(text: &'static str) -> TfError {
    TfError {
        internal: anyhow!("unique constraint violated: {}", text),
        external: ExternalError::conflict(text),
    }
}

/// A mock implementation of datastore::Datastore
#[derive(Clone, Default, Debug)]
pub struct Client {
    tables: Arc<Mutex<Tables>>,
}

#[async_trait]
impl super::Datastore for Client {
    async fn new_user(&self, new_user: NewUser) -> Fallible<User> {
        let mut tables = self.tables.lock().unwrap();
        if tables.users.iter().any(|u| u.username == new_user.username) {
            return Err(conflict("A user with that username already exists"));
        }
        let user = User {
            id: tables.next_id(),
            username: new_user.username,
            email: new_user.email,
            first_name: new_user.first_name,
            last_name: new_user.last_name,
            password_hash: new_user.password_hash,
            date_joined: Utc::now(),
        };
        tables.users.push(user.clone());
        Ok(user)
    }

    async fn get_user(&self, user_id: i32) -> Fallible<Option<User>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.users.iter().find(|u| u.id == user_id).cloned())
    }

    async fn find_user(&self, username: &str) -> Fallible<Option<User>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.users.iter().find(|u| u.username == username).cloned())
    }

    async fn find_users_by_email(&self, email: &str) -> Fallible<Vec<User>> {
        let tables = self.tables.lock().unwrap();
        let email = email.to_lowercase();
        Ok(tables
            .users
            .iter()
            .filter(|u| u.email.to_lowercase() == email)
            .cloned()
            .collect())
    }

    async fn set_password_hash(&self, user_id: i32, password_hash: String) -> Fallible<()> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(user) = tables.users.iter_mut().find(|u| u.id == user_id) {
            user.password_hash = password_hash;
        }
        Ok(())
    }

    async fn new_group(&self, new_group: NewGroup) -> Fallible<Group> {
        let mut tables = self.tables.lock().unwrap();
        if tables.groups.iter().any(|g| g.slug == new_group.slug) {
            return Err(conflict("A group with that slug already exists"));
        }
        let group = Group {
            id: tables.next_id(),
            title: new_group.title,
            slug: new_group.slug,
            description: new_group.description,
        };
        tables.groups.push(group.clone());
        Ok(group)
    }

    async fn list_groups(&self, title_contains: Option<String>) -> Fallible<Vec<Group>> {
        let tables = self.tables.lock().unwrap();
        let needle = title_contains.map(|t| t.to_lowercase());
        let mut groups: Vec<_> = tables
            .groups
            .iter()
            .filter(|g| match &needle {
                Some(needle) => g.title.to_lowercase().contains(needle),
                None => true,
            })
            .cloned()
            .collect();
        groups.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(groups)
    }

    async fn find_group(&self, slug: &str) -> Fallible<Option<Group>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.groups.iter().find(|g| g.slug == slug).cloned())
    }

    async fn delete_group(&self, slug: &str) -> Fallible<Option<Group>> {
        let mut tables = self.tables.lock().unwrap();
        guard!(let Some(index) = tables.groups.iter().position(|g| g.slug == slug) else {
            return Ok(None)
        });
        let group = tables.groups.remove(index);
        for post in tables.posts.iter_mut().filter(|p| p.group_id == Some(group.id)) {
            post.group_id = None;
        }
        Ok(Some(group))
    }

    async fn new_post(&self, new_post: NewPost) -> Fallible<Post> {
        let mut tables = self.tables.lock().unwrap();
        let post = Post {
            id: tables.next_id(),
            text: new_post.text,
            pub_date: new_post.pub_date,
            author_id: new_post.author_id,
            group_id: new_post.group_id,
            image: new_post.image,
        };
        tables.posts.push(post.clone());
        Ok(post)
    }

    async fn count_posts(&self, filters: PostFilters) -> Fallible<i64> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.posts.iter().filter(|p| p.matches(&filters)).count() as i64)
    }

    async fn list_posts(
        &self,
        filters: PostFilters,
        window: Window,
    ) -> Fallible<Vec<PostWithRefs>> {
        let tables = self.tables.lock().unwrap();
        let posts = tables
            .sorted_posts(&filters)
            .into_iter()
            .skip(window.offset as usize)
            .take(window.limit as usize)
            .map(|p| tables.with_refs(p))
            .collect();
        Ok(posts)
    }

    async fn find_post(&self, post_id: i32) -> Fallible<Option<PostWithRefs>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .posts
            .iter()
            .find(|p| p.id == post_id)
            .map(|p| tables.with_refs(p)))
    }

    async fn edit_post(&self, post_id: i32, edit: PostEdit) -> Fallible<Option<Post>> {
        let mut tables = self.tables.lock().unwrap();
        let post = tables.posts.iter_mut().find(|p| p.id == post_id).map(|post| {
            post.text = edit.text;
            post.pub_date = edit.pub_date;
            post.group_id = edit.group_id;
            post.image = edit.image;
            post.clone()
        });
        Ok(post)
    }

    async fn set_post_group(
        &self,
        post_id: i32,
        group_id: Option<i32>,
    ) -> Fallible<Option<Post>> {
        let mut tables = self.tables.lock().unwrap();
        let post = tables.posts.iter_mut().find(|p| p.id == post_id).map(|post| {
            post.group_id = group_id;
            post.clone()
        });
        Ok(post)
    }

    async fn delete_post(&self, post_id: i32) -> Fallible<Option<Post>> {
        let mut tables = self.tables.lock().unwrap();
        guard!(let Some(index) = tables.posts.iter().position(|p| p.id == post_id) else {
            return Ok(None)
        });
        let post = tables.posts.remove(index);
        tables.comments.retain(|c| c.post_id != post.id);
        Ok(Some(post))
    }

    async fn new_comment(&self, new_comment: NewComment) -> Fallible<Comment> {
        let mut tables = self.tables.lock().unwrap();
        let comment = Comment {
            id: tables.next_id(),
            post_id: new_comment.post_id,
            author_id: new_comment.author_id,
            text: new_comment.text,
            created: new_comment.created,
        };
        tables.comments.push(comment.clone());
        Ok(comment)
    }

    async fn list_comments(&self, post_id: i32) -> Fallible<Vec<CommentWithAuthor>> {
        let tables = self.tables.lock().unwrap();
        let mut comments: Vec<_> = tables
            .comments
            .iter()
            .filter(|c| c.post_id == post_id)
            .map(|c| CommentWithAuthor {
                comment: c.clone(),
                author: tables
                    .users
                    .iter()
                    .find(|u| u.id == c.author_id)
                    .cloned()
                    .expect("comment author must exist"),
            })
            .collect();
        comments.sort_by(|a, b| {
            b.comment
                .created
                .cmp(&a.comment.created)
                .then(b.comment.id.cmp(&a.comment.id))
        });
        Ok(comments)
    }

    async fn search_comments(
        &self,
        text_contains: Option<String>,
        limit: i64,
    ) -> Fallible<Vec<Comment>> {
        let tables = self.tables.lock().unwrap();
        let needle = text_contains.map(|t| t.to_lowercase());
        let mut comments: Vec<_> = tables
            .comments
            .iter()
            .filter(|c| match &needle {
                Some(needle) => c.text.to_lowercase().contains(needle),
                None => true,
            })
            .cloned()
            .collect();
        comments.sort_by(|a, b| b.created.cmp(&a.created).then(b.id.cmp(&a.id)));
        comments.truncate(limit as usize);
        Ok(comments)
    }

    async fn delete_comment(&self, comment_id: i32) -> Fallible<Option<Comment>> {
        let mut tables = self.tables.lock().unwrap();
        guard!(let Some(index) = tables.comments.iter().position(|c| c.id == comment_id) else {
            return Ok(None)
        });
        Ok(Some(tables.comments.remove(index)))
    }

    async fn follow(&self, user_id: i32, author_id: i32) -> Fallible<bool> {
        if user_id == author_id {
            return Err(self_follow_error());
        }
        let mut tables = self.tables.lock().unwrap();
        if tables
            .follows
            .iter()
            .any(|f| f.user_id == user_id && f.author_id == author_id)
        {
            return Ok(false);
        }
        let id = tables.next_id();
        tables.follows.push(Follow {
            id,
            user_id,
            author_id,
        });
        Ok(true)
    }

    async fn unfollow(&self, user_id: i32, author_id: i32) -> Fallible<bool> {
        let mut tables = self.tables.lock().unwrap();
        let before = tables.follows.len();
        tables
            .follows
            .retain(|f| !(f.user_id == user_id && f.author_id == author_id));
        Ok(tables.follows.len() != before)
    }

    async fn is_following(&self, user_id: i32, author_id: i32) -> Fallible<bool> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .follows
            .iter()
            .any(|f| f.user_id == user_id && f.author_id == author_id))
    }

    async fn followed_authors(&self, user_id: i32) -> Fallible<Vec<i32>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .follows
            .iter()
            .filter(|f| f.user_id == user_id)
            .map(|f| f.author_id)
            .collect())
    }

    async fn list_follows(&self) -> Fallible<Vec<Follow>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.follows.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastore::Datastore;
    use crate::twoface::Cause;

    fn new_user(username: &str) -> NewUser {
        NewUser {
            username: username.to_owned(),
            email: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            password_hash: String::new(),
        }
    }

    #[actix_rt::test]
    async fn test_follow_constraints() {
        let ds = Client::default();
        let reader = ds.new_user(new_user("reader")).await.unwrap();
        let author = ds.new_user(new_user("author")).await.unwrap();

        assert!(ds.follow(reader.id, author.id).await.unwrap());
        assert!(!ds.follow(reader.id, author.id).await.unwrap());
        assert_eq!(ds.list_follows().await.unwrap().len(), 1);

        let err = ds.follow(reader.id, reader.id).await.unwrap_err();
        assert_eq!(err.cause(), Cause::UserActionInvalid);

        assert!(ds.unfollow(reader.id, author.id).await.unwrap());
        assert!(!ds.unfollow(reader.id, author.id).await.unwrap());
    }

    #[actix_rt::test]
    async fn test_deleting_group_keeps_posts() {
        let ds = Client::default();
        let author = ds.new_user(new_user("author")).await.unwrap();
        let group = ds
            .new_group(NewGroup {
                title: "Cats".to_owned(),
                slug: "cats".to_owned(),
                description: String::new(),
            })
            .await
            .unwrap();
        let post = ds
            .new_post(NewPost {
                text: "meow".to_owned(),
                pub_date: Utc::now(),
                author_id: author.id,
                group_id: Some(group.id),
                image: None,
            })
            .await
            .unwrap();

        ds.delete_group("cats").await.unwrap().unwrap();
        let post = ds.find_post(post.id).await.unwrap().unwrap();
        assert_eq!(post.post.group_id, None);
        assert_eq!(post.group, None);
    }

    #[actix_rt::test]
    async fn test_duplicate_username_conflicts() {
        let ds = Client::default();
        ds.new_user(new_user("leo")).await.unwrap();
        let err = ds.new_user(new_user("leo")).await.unwrap_err();
        assert_eq!(err.cause(), Cause::UserConflict);
    }
}
