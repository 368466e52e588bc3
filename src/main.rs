use actix_cors::Cors;
use actix_files::Files;
use actix_web::{middleware, web, App, HttpServer};
use scanrelay::config::Settings;
use scanrelay::server::{self, Gateway};
use scanrelay::util::{init_tracing, install_panic_hook};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine
    dotenvy::dotenv().ok();
    init_tracing();
    install_panic_hook();

    let settings = Settings::load()?;
    let port = settings.port;
    let prune_every = Duration::from_secs(settings.prune_interval_secs.max(1));
    let static_dir = settings
        .static_dir
        .clone()
        .filter(|dir| Path::new(dir).is_dir());

    if settings.endpoint_url().is_none() || settings.token().is_none() {
        warn!("inference endpoint URL or token not configured: analyze requests will fail");
    }
    info!(
        "daily limit {} per client, model {}",
        settings.daily_limit, settings.model
    );

    let gateway = web::Data::new(Gateway::new(settings)?);
    actix_web::rt::spawn(server::prune_quota(gateway.clone(), prune_every));

    info!("server running: http://localhost:{port}");

    HttpServer::new(move || {
        let app = App::new()
            .app_data(gateway.clone())
            .wrap(middleware::Logger::default())
            .wrap(Cors::permissive())
            .configure(server::configure);

        match &static_dir {
            Some(dir) => app.service(Files::new("/", dir).index_file("index.html")),
            None => app,
        }
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await?;

    Ok(())
}
