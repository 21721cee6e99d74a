use crate::datastore::postfilters::PostFilters;
use crate::datastore::tables::{comments, follows, groups, posts, users};
use chrono::{offset::Utc, DateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How many characters of a post's text identify it in logs and listings.
const POST_HEADLINE_CHARS: usize = 15;

/// A registered user of the website.
#[derive(Queryable, Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// Argon2 PHC string. Never leaves the service.
    pub password_hash: String,
    pub date_joined: DateTime<Utc>,
}

impl User {
    /// "First Last", or the username if the user never gave a name.
    pub fn full_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() {
            self.username.clone()
        } else {
            full.to_owned()
        }
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.username)
    }
}

/// Parameters for the database statement which inserts new users.
#[derive(Insertable, Clone, Debug)]
#[table_name = "users"]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
}

/// A community that posts can be filed under.
#[derive(Queryable, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Group {
    pub id: i32,
    pub title: String,
    pub slug: String,
    pub description: String,
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.title)
    }
}

#[derive(Insertable, Clone, Debug)]
#[table_name = "groups"]
pub struct NewGroup {
    pub title: String,
    pub slug: String,
    pub description: String,
}

/// A post from a user
#[derive(Queryable, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Post {
    pub id: i32,
    pub text: String,
    pub pub_date: DateTime<Utc>,
    pub author_id: i32,
    pub group_id: Option<i32>,
    /// Path relative to the media root, e.g. `posts/<digest>.gif`
    pub image: Option<String>,
}

impl Post {
    #[allow(clippy::nonminimal_bool)]
    /// Does this post match all specified filters?
    pub fn matches(&self, filters: &PostFilters) -> bool {
        if let Some(author_id) = filters.author_id {
            if author_id != self.author_id {
                return false;
            }
        }
        if let Some(authors) = &filters.author_in {
            if !authors.contains(&self.author_id) {
                return false;
            }
        }
        if let Some(group_id) = filters.group_id {
            if Some(group_id) != self.group_id {
                return false;
            }
        }
        if let Some(substring) = &filters.text_contains {
            if !self.text.to_lowercase().contains(&substring.to_lowercase()) {
                return false;
            }
        }
        if let Some(after) = filters.published_after {
            if !(self.pub_date >= after) {
                return false;
            }
        }
        if let Some(before) = filters.published_before {
            if !(self.pub_date < before) {
                return false;
            }
        }
        true
    }
}

impl fmt::Display for Post {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let headline: String = self.text.chars().take(POST_HEADLINE_CHARS).collect();
        write!(f, "{}", headline)
    }
}

/// Parameters for the database statement which inserts new posts.
#[derive(Insertable, Clone, Debug)]
#[table_name = "posts"]
pub struct NewPost {
    pub text: String,
    pub pub_date: DateTime<Utc>,
    pub author_id: i32,
    pub group_id: Option<i32>,
    pub image: Option<String>,
}

/// The full set of editable fields. An edit replaces all of them, so `None` means "clear".
#[derive(AsChangeset, Clone, Debug)]
#[table_name = "posts"]
#[changeset_options(treat_none_as_null = "true")]
pub struct PostEdit {
    pub text: String,
    pub pub_date: DateTime<Utc>,
    pub group_id: Option<i32>,
    pub image: Option<String>,
}

/// A post together with the rows it references, which is what every page shows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PostWithRefs {
    pub post: Post,
    pub author: User,
    pub group: Option<Group>,
}

#[derive(Queryable, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Comment {
    pub id: i32,
    pub post_id: i32,
    pub author_id: i32,
    pub text: String,
    pub created: DateTime<Utc>,
}

impl fmt::Display for Comment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

#[derive(Insertable, Clone, Debug)]
#[table_name = "comments"]
pub struct NewComment {
    pub post_id: i32,
    pub author_id: i32,
    pub text: String,
    pub created: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommentWithAuthor {
    pub comment: Comment,
    pub author: User,
}

/// `user_id` reads posts written by `author_id`.
#[derive(Queryable, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Follow {
    pub id: i32,
    pub user_id: i32,
    pub author_id: i32,
}

#[derive(Insertable, Clone, Copy, Debug)]
#[table_name = "follows"]
pub struct NewFollow {
    pub user_id: i32,
    pub author_id: i32,
}
