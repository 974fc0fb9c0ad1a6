use ember_http::handler::make_handler;
use ember_http::protocol::{HandlerError, MediaType, Request, Response, StatusCode};
use ember_http::server::{Server, ServerOptions};
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

fn main() -> std::io::Result<()> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let handler = make_handler(|_request: &Request, response: Response| {
        response
            .send_body(StatusCode::Ok, "it works", MediaType::TextPlain)
            .into_inner()
            .map_err(HandlerError::other)?;
        Ok(())
    });

    let server = Server::bind("127.0.0.1:8080", ServerOptions::new().threads(1))?;
    server.run(Arc::new(handler))
}
