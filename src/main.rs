mod handlers;
mod rendering;

use clap::Parser;
use coserv::config::NAME;
use coserv::{logging, Route, Router, Server, ServerConfig, Token};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = NAME, about = "HTTP/WebSocket application server", long_about = None)]
struct Cli {
    /// Path to the JSON configuration file.
    config: Option<PathBuf>,
}

fn show_usage() {
    println!("Usage: {NAME} <config.json>");
    println!();
    println!("{NAME} is a coroutine-based HTTP/WebSocket application server.");
    println!();
    println!("Recognized configuration keys:");
    println!("  port              listen port (default: 8080)");
    println!("  thread-num        worker threads (default: # of cpu cores)");
    println!("  conn-num          number of database connections (default: 10)");
    println!("  conn-str          database connection string (default: none)");
    println!("  log-dir           log directory (default: stdout only)");
    println!("  template_root     template base directory (required)");
    println!("  static_root       static file base directory (required)");
}

fn build_routes(config: &ServerConfig) -> Router {
    Router::new(vec![
        Route::new(
            "/",
            handlers::hello,
            vec![Token::Response, Token::Session],
        ),
        Route::new(
            "/register",
            handlers::user_register,
            vec![Token::Request, Token::JsonParams, Token::DbHandle],
        ),
        Route::new(
            "/login",
            handlers::user_login,
            vec![
                Token::Request,
                Token::JsonParams,
                Token::DbHandle,
                Token::Session,
            ],
        ),
        Route::new("/logout", handlers::user_logout, vec![Token::Session]),
        Route::new(
            "/find/<str>",
            handlers::find_user,
            vec![Token::DbHandle, Token::Url(1)],
        ),
        Route::new(
            "/send",
            handlers::send_request,
            vec![Token::Session, Token::HttpClient, Token::JsonParams],
        ),
        Route::new("/echo", handlers::echo, vec![Token::JsonParams]),
        Route::new(
            "/users/<int>",
            handlers::view_users,
            vec![
                Token::DbHandle,
                Token::Session,
                Token::Response,
                Token::literal(config.template_root.clone()),
                Token::Url(1),
            ],
        ),
        Route::new(
            "/statics/<path>",
            handlers::serve_static,
            vec![
                Token::Response,
                Token::literal(config.static_root.clone()),
                Token::Url(1),
            ],
        ),
    ])
}

fn build_ws_routes() -> Router {
    Router::new(vec![Route::new(
        "/echo",
        handlers::ws_echo,
        vec![Token::Session, Token::WsChannel],
    )])
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let Some(path) = cli.config else {
        show_usage();
        return ExitCode::FAILURE;
    };
    let config = match ServerConfig::load(&path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e:#}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = logging::init(&config) {
        eprintln!("logging initialization failed: {e:#}");
        return ExitCode::FAILURE;
    }

    let routes = build_routes(&config);
    let ws_routes = build_ws_routes();
    match Server::new(config, routes, ws_routes).run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}
