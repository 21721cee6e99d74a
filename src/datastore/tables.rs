table! {
    users (id) {
        id -> Int4,
        username -> Varchar,
        email -> Varchar,
        first_name -> Varchar,
        last_name -> Varchar,
        password_hash -> Text,
        date_joined -> Timestamptz,
    }
}

table! {
    groups (id) {
        id -> Int4,
        title -> Varchar,
        slug -> Varchar,
        description -> Text,
    }
}

table! {
    posts (id) {
        id -> Int4,
        text -> Text,
        pub_date -> Timestamptz,
        author_id -> Int4,
        group_id -> Nullable<Int4>,
        image -> Nullable<Varchar>,
    }
}

table! {
    comments (id) {
        id -> Int4,
        post_id -> Int4,
        author_id -> Int4,
        text -> Text,
        created -> Timestamptz,
    }
}

table! {
    follows (id) {
        id -> Int4,
        user_id -> Int4,
        author_id -> Int4,
    }
}

joinable!(posts -> users (author_id));
joinable!(posts -> groups (group_id));
joinable!(comments -> posts (post_id));
joinable!(comments -> users (author_id));

allow_tables_to_appear_in_same_query!(users, groups, posts, comments, follows);
