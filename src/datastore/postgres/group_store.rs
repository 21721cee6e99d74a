use crate::datastore::{
    postgres::errors::{like_pattern, unique_violation_as},
    structs::{Group, NewGroup},
    tables::groups,
};
use crate::twoface::{ExternalError, Fallible};
use diesel::{pg::PgConnection, prelude::*};

pub fn new_group(conn: &PgConnection, new_group: &NewGroup) -> Fallible<Group> {
    diesel::insert_into(groups::table)
        .values(new_group)
        .get_result(conn)
        .map_err(|e| {
            unique_violation_as(
                e,
                ExternalError::conflict("A group with that slug already exists"),
            )
        })
}

pub fn list_groups(conn: &PgConnection, title_contains: Option<&str>) -> Fallible<Vec<Group>> {
    let mut query = groups::table.into_boxed();
    if let Some(substring) = title_contains {
        query = query.filter(groups::title.ilike(like_pattern(substring)));
    }
    let groups = query.order(groups::title).load(conn)?;
    Ok(groups)
}

pub fn find_group(conn: &PgConnection, slug: &str) -> Fallible<Option<Group>> {
    let group = groups::table
        .filter(groups::slug.eq(slug))
        .first(conn)
        .optional()?;
    Ok(group)
}

/// `posts.group_id` is `ON DELETE SET NULL`, so the group's posts survive.
pub fn delete_group(conn: &PgConnection, slug: &str) -> Fallible<Option<Group>> {
    let group = diesel::delete(groups::table.filter(groups::slug.eq(slug)))
        .get_result(conn)
        .optional()?;
    Ok(group)
}
