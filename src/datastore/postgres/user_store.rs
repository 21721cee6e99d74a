//! Users and the follow graph between them.
use crate::datastore::{
    postgres::errors::unique_violation_as,
    self_follow_error,
    structs::{Follow, NewFollow, NewUser, User},
    tables::{follows, users},
};
use crate::twoface::{ExternalError, Fallible};
use diesel::{dsl::exists, pg::PgConnection, prelude::*, sql_types::Text};

sql_function!(fn lower(x: Text) -> Text);

pub fn new_user(conn: &PgConnection, new_user: &NewUser) -> Fallible<User> {
    diesel::insert_into(users::table)
        .values(new_user)
        .get_result(conn)
        .map_err(|e| {
            unique_violation_as(
                e,
                ExternalError::conflict("A user with that username already exists"),
            )
        })
}

pub fn get_user(conn: &PgConnection, user_id: i32) -> Fallible<Option<User>> {
    let user = users::table.find(user_id).get_result(conn).optional()?;
    Ok(user)
}

pub fn find_user(conn: &PgConnection, username: &str) -> Fallible<Option<User>> {
    let user = users::table
        .filter(users::username.eq(username))
        .first(conn)
        .optional()?;
    Ok(user)
}

pub fn find_users_by_email(conn: &PgConnection, email: &str) -> Fallible<Vec<User>> {
    let users = users::table
        .filter(lower(users::email).eq(email.to_lowercase()))
        .order(users::id)
        .load(conn)?;
    Ok(users)
}

pub fn set_password_hash(conn: &PgConnection, user_id: i32, password_hash: &str) -> Fallible<()> {
    diesel::update(users::table.find(user_id))
        .set(users::password_hash.eq(password_hash))
        .execute(conn)?;
    Ok(())
}

pub fn follow(conn: &PgConnection, user_id: i32, author_id: i32) -> Fallible<bool> {
    // The table's check constraint would also catch this, but as an opaque DB error.
    if user_id == author_id {
        return Err(self_follow_error());
    }
    let inserted = diesel::insert_into(follows::table)
        .values(&NewFollow { user_id, author_id })
        .on_conflict_do_nothing()
        .execute(conn)?;
    Ok(inserted == 1)
}

pub fn unfollow(conn: &PgConnection, user_id: i32, author_id: i32) -> Fallible<bool> {
    let deleted = diesel::delete(
        follows::table
            .filter(follows::user_id.eq(user_id))
            .filter(follows::author_id.eq(author_id)),
    )
    .execute(conn)?;
    Ok(deleted > 0)
}

pub fn is_following(conn: &PgConnection, user_id: i32, author_id: i32) -> Fallible<bool> {
    let following = diesel::select(exists(
        follows::table
            .filter(follows::user_id.eq(user_id))
            .filter(follows::author_id.eq(author_id)),
    ))
    .get_result(conn)?;
    Ok(following)
}

pub fn followed_authors(conn: &PgConnection, user_id: i32) -> Fallible<Vec<i32>> {
    let authors = follows::table
        .filter(follows::user_id.eq(user_id))
        .select(follows::author_id)
        .load(conn)?;
    Ok(authors)
}

pub fn list_follows(conn: &PgConnection) -> Fallible<Vec<Follow>> {
    let follows = follows::table.order(follows::id).load(conn)?;
    Ok(follows)
}
