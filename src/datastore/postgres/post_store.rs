//! Posts and the comments under them.
use crate::datastore::{
    postfilters::{PostFilters, Window},
    postgres::errors::like_pattern,
    structs::{
        Comment, CommentWithAuthor, Group, NewComment, NewPost, Post, PostEdit, PostWithRefs, User,
    },
    tables::{comments, groups, posts, users},
};
use crate::twoface::Fallible;
use anyhow::anyhow;
use diesel::{
    dsl::{count_star, sql},
    expression::BoxableExpression,
    pg::{Pg, PgConnection},
    prelude::*,
    sql_types::Bool,
};
use std::collections::HashMap;

pub fn new_post(conn: &PgConnection, new_post: &NewPost) -> Fallible<Post> {
    let post = diesel::insert_into(posts::table)
        .values(new_post)
        .get_result(conn)?;
    Ok(post)
}

pub fn count_posts(conn: &PgConnection, filters: &PostFilters) -> Fallible<i64> {
    let mut query = posts::table.select(count_star()).into_boxed();
    for filter in filters.as_sql_where() {
        query = query.filter(filter);
    }
    let count = query.get_result(conn)?;
    Ok(count)
}

pub fn list_posts(
    conn: &PgConnection,
    filters: &PostFilters,
    window: Window,
) -> Fallible<Vec<PostWithRefs>> {
    let mut query = posts::table.into_boxed();
    for filter in filters.as_sql_where() {
        query = query.filter(filter);
    }
    let posts: Vec<Post> = query
        .order((posts::pub_date.desc(), posts::id.desc()))
        .offset(window.offset)
        .limit(window.limit)
        .load(conn)?;
    attach_refs(conn, posts)
}

pub fn find_post(conn: &PgConnection, post_id: i32) -> Fallible<Option<PostWithRefs>> {
    let post: Option<Post> = posts::table.find(post_id).first(conn).optional()?;
    guard!(let Some(post) = post else {
        return Ok(None);
    });
    Ok(attach_refs(conn, vec![post])?.pop())
}

pub fn edit_post(conn: &PgConnection, post_id: i32, edit: &PostEdit) -> Fallible<Option<Post>> {
    let post = diesel::update(posts::table.find(post_id))
        .set(edit)
        .get_result(conn)
        .optional()?;
    Ok(post)
}

pub fn set_post_group(
    conn: &PgConnection,
    post_id: i32,
    group_id: Option<i32>,
) -> Fallible<Option<Post>> {
    let post = diesel::update(posts::table.find(post_id))
        .set(posts::group_id.eq(group_id))
        .get_result(conn)
        .optional()?;
    Ok(post)
}

/// `comments.post_id` is `ON DELETE CASCADE`.
pub fn delete_post(conn: &PgConnection, post_id: i32) -> Fallible<Option<Post>> {
    let post = diesel::delete(posts::table.find(post_id))
        .get_result(conn)
        .optional()?;
    Ok(post)
}

/// Load the author and group of every post with one query each, instead of one per post.
fn attach_refs(conn: &PgConnection, posts: Vec<Post>) -> Fallible<Vec<PostWithRefs>> {
    if posts.is_empty() {
        return Ok(Vec::new());
    }
    let author_ids: Vec<i32> = posts.iter().map(|p| p.author_id).collect();
    let group_ids: Vec<i32> = posts.iter().filter_map(|p| p.group_id).collect();

    let authors: HashMap<i32, User> = users::table
        .filter(users::id.eq_any(author_ids))
        .load::<User>(conn)?
        .into_iter()
        .map(|u| (u.id, u))
        .collect();
    let groups: HashMap<i32, Group> = if group_ids.is_empty() {
        HashMap::new()
    } else {
        groups::table
            .filter(groups::id.eq_any(group_ids))
            .load::<Group>(conn)?
            .into_iter()
            .map(|g| (g.id, g))
            .collect()
    };

    posts
        .into_iter()
        .map(|post| {
            let author = authors
                .get(&post.author_id)
                .cloned()
                .ok_or_else(|| anyhow!("post {} has no author row", post.id))?;
            let group = post.group_id.and_then(|id| groups.get(&id).cloned());
            Ok(PostWithRefs {
                post,
                author,
                group,
            })
        })
        .collect()
}

pub fn new_comment(conn: &PgConnection, new_comment: &NewComment) -> Fallible<Comment> {
    let comment = diesel::insert_into(comments::table)
        .values(new_comment)
        .get_result(conn)?;
    Ok(comment)
}

pub fn list_comments(conn: &PgConnection, post_id: i32) -> Fallible<Vec<CommentWithAuthor>> {
    let rows: Vec<(Comment, User)> = comments::table
        .inner_join(users::table)
        .filter(comments::post_id.eq(post_id))
        .order((comments::created.desc(), comments::id.desc()))
        .load(conn)?;
    Ok(rows
        .into_iter()
        .map(|(comment, author)| CommentWithAuthor { comment, author })
        .collect())
}

pub fn search_comments(
    conn: &PgConnection,
    text_contains: Option<&str>,
    limit: i64,
) -> Fallible<Vec<Comment>> {
    let mut query = comments::table.into_boxed();
    if let Some(substring) = text_contains {
        query = query.filter(comments::text.ilike(like_pattern(substring)));
    }
    let comments = query
        .order((comments::created.desc(), comments::id.desc()))
        .limit(limit)
        .load(conn)?;
    Ok(comments)
}

pub fn delete_comment(conn: &PgConnection, comment_id: i32) -> Fallible<Option<Comment>> {
    let comment = diesel::delete(comments::table.find(comment_id))
        .get_result(conn)
        .optional()?;
    Ok(comment)
}

impl PostFilters {
    pub fn as_sql_where(
        &self,
    ) -> Vec<Box<dyn BoxableExpression<posts::table, Pg, SqlType = Bool>>> {
        let mut wheres: Vec<Box<dyn BoxableExpression<posts::table, Pg, SqlType = Bool>>> =
            Vec::new();
        if let Some(author_id) = self.author_id {
            wheres.push(Box::new(posts::author_id.eq(author_id)))
        }
        if let Some(author_ids) = &self.author_in {
            if author_ids.is_empty() {
                wheres.push(Box::new(sql::<Bool>("FALSE")))
            } else {
                wheres.push(Box::new(posts::author_id.eq_any(author_ids.clone())))
            }
        }
        if let Some(group_id) = self.group_id {
            wheres.push(Box::new(posts::group_id.eq(group_id)))
        }
        if let Some(substring) = &self.text_contains {
            wheres.push(Box::new(posts::text.ilike(like_pattern(substring))))
        }
        if let Some(after) = self.published_after {
            wheres.push(Box::new(posts::pub_date.ge(after)))
        }
        if let Some(before) = self.published_before {
            wheres.push(Box::new(posts::pub_date.lt(before)))
        }
        wheres
    }
}
