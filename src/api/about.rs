//! Static pages about the site and its author.
use crate::api::observe;
use crate::twoface::Fallible;
use actix_web::web;
use serde::Serialize;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/author/", web::get().to(author))
        .route("/tech/", web::get().to(tech));
}

#[derive(Serialize, Debug, PartialEq, Eq)]
pub struct StaticPage {
    pub title: &'static str,
    pub text: &'static str,
}

const AUTHOR: StaticPage = StaticPage {
    title: "About the author",
    text: "Yatube is written and maintained by a developer who likes small, fast web services.",
};

const TECH: StaticPage = StaticPage {
    title: "Technologies",
    text: "Rust, actix-web, diesel and PostgreSQL. Pages are served as JSON documents.",
};

async fn author() -> Fallible<web::Json<StaticPage>> {
    observe("about_author", || async { Ok(web::Json(AUTHOR)) }).await
}

async fn tech() -> Fallible<web::Json<StaticPage>> {
    observe("about_tech", || async { Ok(web::Json(TECH)) }).await
}

#[cfg(test)]
mod tests {
    use crate::api::testing;
    use actix_web::{http::StatusCode, test};
    use serde_json::Value;

    #[actix_rt::test]
    async fn test_static_pages() {
        let st = testing::state();
        let mut app = test_app!(st);
        for (uri, title) in &[
            ("/about/author/", "About the author"),
            ("/about/tech/", "Technologies"),
        ] {
            let req = test::TestRequest::get().uri(uri).to_request();
            let resp = test::call_service(&mut app, req).await;
            assert_eq!(resp.status(), StatusCode::OK);
            let body: Value = test::read_body_json(resp).await;
            assert_eq!(body["title"], *title);
        }
    }
}
