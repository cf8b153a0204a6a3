// HTTP Honeypot Implementation
// Serves a fake WordPress site, captures login posts and flags scanner
// traffic, always answering like a slow commodity PHP stack

use crate::capture::CaptureSink;
use crate::signatures::Signatures;
use crate::types::{Observation, ServiceType, Severity};
use anyhow::{Context, Result};
use axum::{
    extract::{ConnectInfo, Form, Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::{any, get},
    Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Artificial latency before any response; commodity PHP sites are slow
const RESPONSE_DELAY: Duration = Duration::from_millis(300);

const SERVER_HEADER: &str = "Apache/2.4.58 (Ubuntu)";
const POWERED_BY_HEADER: &str = "PHP/8.2.12";

/// Run the HTTP honeypot on the given port until shutdown.
pub async fn run(
    port: u16,
    sink: Arc<CaptureSink>,
    signatures: Arc<Signatures>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let state = Arc::new(HttpState { sink, signatures });
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind HTTP honeypot to {addr}"))?;

    log::info!("HTTP honeypot listening on {addr}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = shutdown.recv().await;
    })
    .await
    .context("HTTP honeypot terminated")?;

    log::info!("HTTP honeypot stopped");
    Ok(())
}

struct HttpState {
    sink: Arc<CaptureSink>,
    signatures: Arc<Signatures>,
}

fn router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/", any(index))
        .route("/wp-login.php", get(login_form).post(login_submit))
        .route("/wp-admin", get(admin_page))
        .route("/logo.png", get(logo))
        .fallback(not_found)
        .with_state(Arc::clone(&state))
        .layer(middleware::from_fn_with_state(state, deception_layer))
}

/// Stalls, records and classifies every request, then stamps the
/// deception headers onto whatever the route produced.
async fn deception_layer(
    State(state): State<Arc<HttpState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    tokio::time::sleep(RESPONSE_DELAY).await;

    let ip = peer.ip().to_string();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let query = request.uri().query().unwrap_or("").to_string();
    let headers = request
        .headers()
        .iter()
        .map(|(name, value)| format!("{}: {}", name, value.to_str().unwrap_or("<binary>")))
        .collect::<Vec<_>>()
        .join("; ");

    // matched against the raw query string; percent-encoded probes are
    // intentionally not unescaped first
    let suspicious_path = state.signatures.classify_http_path(&path);
    let sql_injection = state.signatures.classify_http_query(&query);

    let (severity, label) = if suspicious_path.is_some() || sql_injection.is_some() {
        (Severity::Warning, "Suspicious HTTP request")
    } else {
        (Severity::Info, "HTTP request")
    };

    let mut observation = Observation::new(
        severity,
        ServiceType::Http,
        peer.to_string(),
        format!("{label} - IP: {ip}, Method: {method}, Path: {path}"),
    )
    .with_attr("method", method)
    .with_attr("path", path)
    .with_attr("headers", headers)
    .with_attr("remote", ip);
    if let Some(fragment) = suspicious_path {
        observation = observation.with_attr("suspicious_path", fragment);
    }
    if let Some(pattern) = sql_injection {
        observation = observation.with_attr("sql_injection", pattern);
    }
    state.sink.emit(observation);

    let mut response = next.run(request).await;

    let headers = response.headers_mut();
    headers.insert(header::SERVER, HeaderValue::from_static(SERVER_HEADER));
    headers.insert("X-Powered-By", HeaderValue::from_static(POWERED_BY_HEADER));

    response
}

#[derive(Deserialize)]
struct LoginForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

async fn index() -> Html<&'static str> {
    Html(HOMEPAGE_HTML)
}

async fn login_form() -> Html<&'static str> {
    Html(LOGIN_FORM_HTML)
}

/// Capture the posted credentials, then turn the attacker away with a
/// believable error.
async fn login_submit(
    State(state): State<Arc<HttpState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Form(form): Form<LoginForm>,
) -> impl IntoResponse {
    let ip = peer.ip().to_string();

    state.sink.emit(
        Observation::new(
            Severity::Warning,
            ServiceType::Http,
            peer.to_string(),
            format!(
                "HTTP Login attempt - IP: {ip}, Username: '{}', Password: '{}'",
                form.username, form.password
            ),
        )
        .with_attr("username", form.username)
        .with_attr("password", form.password)
        .with_attr("login_page", "/wp-login.php"),
    );

    (StatusCode::UNAUTHORIZED, Html(LOGIN_ERROR_HTML))
}

async fn admin_page() -> Html<&'static str> {
    Html(ADMIN_HTML)
}

async fn logo() -> Response {
    match tokio::fs::read("images/logo.png").await {
        Ok(bytes) => ([(header::CONTENT_TYPE, "image/png")], bytes).into_response(),
        Err(_) => (StatusCode::NOT_FOUND, "404 - Page not found").into_response(),
    }
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "404 - Page not found")
}

const HOMEPAGE_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>WordPress Site</title>
    <link rel="stylesheet" href="/wp-content/themes/twentyTwenty/style.css">
</head>
<body>
    <div class="wp-site-blocks">
        <main>
            <article>
                <h2>Hello world!</h2>
                <p>Welcome to WordPress. This is your first post</p>
                <p><a href="/wp-login.php">Log in</a></p>
            </article>
        </main>
        <footer>Powered by WordPress 6.4.3</footer>
    </div>
</body>
</html>
"#;

const LOGIN_FORM_HTML: &str = r#"<!DOCTYPE html>
<html lang="en-US">
<head>
    <meta http-equiv="Content-Type" content="text/html; charset=UTF-8">
    <title>Log In &lsaquo; WordPress &mdash; WordPress</title>
    <meta name='robots' content='max-image-preview:large, noindex, noarchive'>
    <link rel='stylesheet' id='dashicons-css' href='https://wordpress.org/wp-includes/css/dashicons.min.css' type='text/css' media='all'>
    <link rel='stylesheet' id='buttons-css' href='https://wordpress.org/wp-includes/css/buttons.min.css' type='text/css' media='all'>
    <link rel='stylesheet' id='forms-css' href='https://wordpress.org/wp-admin/css/forms.min.css' type='text/css' media='all'>
    <link rel='stylesheet' id='login-css' href='https://wordpress.org/wp-admin/css/login.min.css' type='text/css' media='all'>
    <meta name='referrer' content='strict-origin-when-cross-origin'>
    <meta name="viewport" content="width=device-width">
    <style>
        .login h1 a {
            background-image: url('/logo.png');
            background-size: contain;
            background-repeat: no-repeat;
            background-position: center;
            width: 84px;
            height: 84px;
        }
    </style>
</head>
<body class="login no-js login-action-login wp-core-ui locale-en-us">
<script type="text/javascript">document.body.className = document.body.className.replace('no-js','js');</script>

<div id="login">
    <h1><a href="https://wordpress.org/">Powered by WordPress</a></h1>

    <form name="loginform" id="loginform" action="/wp-login.php" method="post">
        <p>
            <label for="user_login">Username or Email Address</label>
            <input type="text" name="username" id="user_login" class="input" value="" size="20" autocapitalize="off" autocomplete="username" required>
        </p>

        <div class="user-pass-wrap">
            <label for="user_pass">Password</label>
            <div class="wp-pwd">
                <input type="password" name="password" id="user_pass" class="input password-input" value="" size="20" autocomplete="current-password" required>
                <button type="button" class="button button-secondary wp-hide-pw hide-if-no-js" data-toggle="0" aria-label="Show password">
                    <span class="dashicons dashicons-visibility" aria-hidden="true"></span>
                </button>
            </div>
        </div>

        <p class="forgetmenot">
            <input name="rememberme" type="checkbox" id="rememberme" value="forever">
            <label for="rememberme">Remember Me</label>
        </p>

        <p class="submit">
            <input type="submit" name="wp-submit" id="wp-submit" class="button button-primary button-large" value="Log In">
            <input type="hidden" name="redirect_to" value="/wp-admin/">
            <input type="hidden" name="testcookie" value="1">
        </p>
    </form>

    <p id="nav">
        <a href="/wp-login.php?action=lostpassword">Lost your password?</a>
    </p>

    <p id="backtoblog">
        <a href="/">&larr; Go to Site</a>
    </p>
</div>

<div class="clear"></div>
</body>
</html>
"#;

const LOGIN_ERROR_HTML: &str = r#"<div style="margin: 40px; padding: 20px; border: 1px solid #f00; background: #fee;">
    <h3>Login Error</h3>
    <p>The username or password you entered is incorrect.</p>
    <p><a href="/wp-login.php">Try again</a></p>
</div>
"#;

const ADMIN_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>WordPress Admin &bull; WordPress Site</title>
    <style>
        body { font-family: Arial, sans-serif; margin: 0; background: #f1f1f1; }
        .wp-admin-bar { background: #23282d; color: white; padding: 15px; }
        .admin-content { padding: 20px; }
        .notice { background: #fff; border-left: 4px solid #00a0d2; padding: 10px; margin: 10px 0; }
    </style>
</head>
<body>
    <div class="wp-admin-bar">
        <strong>WordPress Admin</strong> &bull; WordPress Site
    </div>
    <div class="admin-content">
        <h2>Dashboard</h2>
        <div class="notice">
            <p>Please log in to access the WordPress admin area.</p>
            <p><a href="/wp-login.php">Log in here</a></p>
        </div>
    </div>
</body>
</html>
"#;
