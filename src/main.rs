mod api;
mod config;
mod datastore;
mod metrics;
mod twoface;

#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate prometheus;
#[macro_use]
extern crate guard;
#[macro_use]
extern crate diesel;

use crate::api::{auth::Tokens, cache::PageCache, mail::Mailer, media::MediaStore};
use crate::config::Config;
use crate::datastore::postgres::PostgresStore;
use actix_service::Service;
use actix_web::{dev::ServiceResponse, middleware, web, App, HttpServer};
use datastore::postgres;
use futures::future::FutureExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};

#[allow(clippy::cognitive_complexity)]
fn main() {
    let args: Vec<_> = std::env::args().collect();
    guard!(let [_, config_file_path, ..] = &args[..] else {
        eprintln!("First argument should be path to config file");
        return
    });

    let config = match Config::from_file(config_file_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{:#}", e);
            std::process::exit(1);
        }
    };

    // Set up logger output
    let subscriber_builder = tracing_subscriber::fmt().with_max_level(Level::DEBUG);
    if config.human_logs {
        subscriber_builder.init();
    } else {
        subscriber_builder.json().init();
    }

    info!("starting yatube");

    let sys = actix_rt::System::new("yatube");

    // Build the postgres client
    let db = PostgresStore::new(
        postgres::Dsn::new(&config),
        config.db_pool_size,
        Duration::from_secs(config.db_connection_timeout),
    )
    .expect("couldn't connect to Postgres");
    prometheus::register(Box::new(db.clone())).expect("couldn't register DB metrics");

    // Build the app state shared by the userfacing and admin listeners
    let state = api::State {
        ds: Arc::new(db),
        index_cache: Arc::new(PageCache::new(Duration::from_secs(config.index_cache_secs))),
        media: Arc::new(MediaStore::new(config.media_root.clone())),
        mailer: Arc::new(Mailer::from_config(&config).expect("invalid mail settings")),
        posts_per_page: config.posts_per_page,
        site_url: config.site_url.clone(),
    };
    let tokens = Tokens::new(&config.jwt_secret, config.token_ttl_secs)
        .with_reset_ttl(config.password_reset_ttl_secs);

    // Start the userfacing server
    info!(
        addr = &config.userfacing_listen_address[..],
        "starting userfacing server"
    );
    let max_body_size = config.max_body_size;
    let userfacing_state = state.clone();
    HttpServer::new(move || {
        App::new()
            // Middleware for Prometheus
            .wrap_fn(|request, srv| {
                srv.call(request)
                    .map(|response| increment_response_metrics("userfacing", response))
            })
            // enable logger
            .wrap(middleware::Logger::default())
            .data(userfacing_state.clone())
            .data(tokens.clone())
            // limit size of the payload, and answer bad bodies, paths and queries with JSON
            .app_data(api::json_config(max_body_size))
            .app_data(api::path_config())
            .app_data(api::query_config())
            .configure(api::configure_userfacing::<PostgresStore>)
            .default_service(web::route().to(api::not_found))
    })
    .bind(config.userfacing_listen_address.clone())
    .expect("couldn't start userfacing HTTP server")
    .run();

    // Start the admin server
    info!(
        addr = &config.admin_listen_address[..],
        "starting admin server"
    );
    HttpServer::new(move || {
        App::new()
            .wrap_fn(|request, srv| {
                srv.call(request)
                    .map(|response| increment_response_metrics("admin", response))
            })
            .wrap(middleware::Logger::default())
            .data(state.clone())
            .app_data(api::json_config(max_body_size))
            .app_data(api::path_config())
            .app_data(api::query_config())
            .service(web::scope("/admin").configure(api::admin::configure::<PostgresStore>))
            .default_service(web::route().to(api::not_found))
    })
    .bind(config.admin_listen_address.clone())
    .expect("couldn't start admin HTTP server")
    .run();

    // Start the metrics server
    info!(
        addr = &config.metrics_address[..],
        "starting metrics server"
    );
    HttpServer::new(|| {
        App::new().service(
            web::scope("/metrics")
                .service(web::resource("/").route(web::get().to(metrics::endpoint::gather)))
                .service(web::resource("").route(web::get().to(metrics::endpoint::gather))),
        )
    })
    .bind(config.metrics_address)
    .expect("couldn't start metrics server")
    .run();

    sys.run().expect("actix runtime terminated");
}

/// If response is OK, increment the metrics for HTTP statuses.
fn increment_response_metrics<E, B>(
    listener: &'static str,
    response: Result<ServiceResponse<B>, E>,
) -> Result<ServiceResponse<B>, E> {
    match response {
        Ok(response) => {
            metrics::HTTP_RESPONSES
                .with_label_values(&[listener, response.status().as_str()])
                .inc();
            Ok(response)
        }
        other => other,
    }
}
