//! Demo application handlers: user registration and login against an
//! `auth_user` table, a session-counting welcome page, an outbound
//! request example, paginated user listing, static files and a
//! WebSocket echo.

use anyhow::anyhow;
use coserv::db::{self, Column, ColumnType, DbConn, DbTransaction, RowMap, SqlRow, SqlValue};
use coserv::router::{HandlerResult, IntoReply, JsonParams, Reply};
use coserv::security;
use coserv::{HttpClient, HttpRequest, ResponseHandle, ServiceError, Session, WsChannel};
use http::Method;
use once_cell::sync::Lazy;
use serde_json::{json, Map, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::rendering;

const PAGE_SIZE: i64 = 10;

/// Field order matches `select * from auth_user`.
static ORM_USER: Lazy<RowMap> = Lazy::new(|| {
    RowMap::new(vec![
        Column::new("id", ColumnType::Int),
        Column::new("username", ColumnType::Text),
        Column::new("password", ColumnType::Text),
        Column::new("is_superuser", ColumnType::Bool),
        Column::new("first_name", ColumnType::Text),
        Column::new("last_name", ColumnType::Text),
        Column::new("email", ColumnType::Text),
        Column::new("is_active", ColumnType::Bool),
    ])
});

fn get_user(
    tx: &mut DbTransaction<'_>,
    username: &str,
) -> Result<Option<Map<String, Value>>, ServiceError> {
    let r = tx.exec("select * from auth_user where username = ?", &[username.into()])?;
    info!("{}", r.query());
    ORM_USER.convert_to_optional(r.rows())
}

fn get_or_empty(params: &Map<String, Value>, key: &str) -> String {
    params
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string()
}

/// Session-counting welcome; fills the response body itself.
pub fn hello(response: ResponseHandle, session: Session) -> HandlerResult {
    let obj = {
        let mut data = session.lock();
        if data.contains_key("user") {
            let count = data.get("count").and_then(Value::as_i64).unwrap_or(0) + 1;
            data.insert("count".to_string(), Value::from(count));
            let username = data
                .get("user")
                .and_then(|u| u.get("username"))
                .cloned()
                .unwrap_or(Value::Null);
            json!({ "welcome": username, "count": count })
        } else {
            json!({ "msg": "hello, world!" })
        }
    };
    response
        .lock()
        .set_body(serde_json::to_vec(&obj).unwrap_or_default());
    Ok(Reply::Manual)
}

pub fn user_register(
    request: Arc<HttpRequest>,
    params: JsonParams,
    conn: DbConn,
) -> HandlerResult {
    if request.method != Method::POST {
        return Err(ServiceError::NotFound);
    }
    let Some(username) = params.get("username").and_then(Value::as_str) else {
        return json!({ "success": false, "message": "`username` is required" }).into_reply();
    };
    let Some(password) = params.get("password").and_then(Value::as_str) else {
        return json!({ "success": false, "message": "`password` is required" }).into_reply();
    };
    let mut tx = conn.transaction()?;
    if get_user(&mut tx, username)?.is_some() {
        return json!({ "success": false, "message": "`username` existed" }).into_reply();
    }
    let r = tx.exec(
        "insert into ? \
         (?, password, is_superuser, \
         first_name, last_name, email, is_active) values \
         (?, ?, ?, ?, ?, ?, ?)",
        &[
            db::name("auth_user"),
            db::name("username"),
            username.into(),
            security::encode_password(password).into(),
            false.into(),
            get_or_empty(&params, "first_name").into(),
            get_or_empty(&params, "last_name").into(),
            get_or_empty(&params, "email").into(),
            true.into(),
        ],
    )?;
    info!("{}", r.query());
    tx.commit()?;
    json!({ "success": true, "message": "user registered" }).into_reply()
}

pub fn user_login(
    request: Arc<HttpRequest>,
    params: JsonParams,
    conn: DbConn,
    session: Session,
) -> HandlerResult {
    if request.method != Method::POST {
        return Err(ServiceError::NotFound);
    }
    let Some(username) = params.get("username").and_then(Value::as_str) else {
        return json!({ "success": false, "message": "`username` is required" }).into_reply();
    };
    let Some(password) = params.get("password").and_then(Value::as_str) else {
        return json!({ "success": false, "message": "`password` is required" }).into_reply();
    };
    let mut tx = conn.transaction()?;
    let Some(user) = get_user(&mut tx, username)? else {
        return json!({ "success": false, "message": "invalid username/password" }).into_reply();
    };
    if user.get("is_active") != Some(&Value::Bool(true)) {
        return json!({ "success": false, "message": "invalid username/password" }).into_reply();
    }
    let encoded = user.get("password").and_then(Value::as_str).unwrap_or("");
    if !security::check_password(password, encoded) {
        return json!({ "success": false, "message": "invalid username/password" }).into_reply();
    }
    session
        .lock()
        .insert("user".to_string(), Value::Object(user));
    json!({ "success": true, "message": "login successfully" }).into_reply()
}

pub fn user_logout(session: Session) -> HandlerResult {
    session.lock().remove("user");
    json!({ "success": true, "message": "logout successfully" }).into_reply()
}

pub fn find_user(conn: DbConn, username: String) -> HandlerResult {
    let mut tx = conn.transaction()?;
    let Some(mut user) = get_user(&mut tx, &username)? else {
        return json!({ "success": false, "message": "requested user does not exist" })
            .into_reply();
    };
    user.remove("id");
    user.remove("password");
    json!({ "success": true, "user": user }).into_reply()
}

/// Forward the parameters to the local `/echo` route and count sends in
/// the session.
pub fn send_request(session: Session, client: HttpClient, params: JsonParams) -> HandlerResult {
    let response = client.post_json(
        "localhost",
        8080,
        "/echo",
        &json!({ "request": params.0 }),
    )?;
    let cnt = {
        let mut data = session.lock();
        let cnt = data.get("cnt").and_then(Value::as_i64).unwrap_or(0) + 1;
        data.insert("cnt".to_string(), Value::from(cnt));
        cnt
    };
    json!({ "response": response, "cnt": cnt }).into_reply()
}

pub fn echo(params: JsonParams) -> HandlerResult {
    json!({ "echo": params.0 }).into_reply()
}

/// WebSocket echo: announce the session's send counter, then mirror
/// every message until the peer closes.
pub fn ws_echo(session: Session, ws: Arc<WsChannel>) -> HandlerResult {
    let cnt = session.lock().get("cnt").cloned().unwrap_or(Value::Null);
    ws.write_json(&cnt)?;
    loop {
        match ws.read() {
            Ok(data) => ws.write(&data)?,
            Err(ServiceError::WsClosed) => break,
            Err(e) => return Err(e),
        }
    }
    Ok(Reply::Manual)
}

pub fn serve_static(response: ResponseHandle, static_root: String, path: String) -> HandlerResult {
    coserv::files::serve(&response, &Path::new(&static_root).join(path))
}

/// Paginated user listing; renders `users.html` when a template root is
/// configured and returns the raw context otherwise.
pub fn view_users(
    conn: DbConn,
    session: Session,
    response: ResponseHandle,
    template_root: String,
    page_num: String,
) -> HandlerResult {
    let page_id: i64 = page_num
        .parse()
        .map_err(|e| anyhow!("invalid page number `{page_num}`: {e}"))?;
    debug!(page_id, "view users");

    let mut tx = conn.transaction()?;
    let r = tx.exec("select count(*) from auth_user;", &[])?;
    info!("{}", r.query());
    let total_users: i64 = match r.rows().first() {
        Some(row) => row
            .column_text(0)?
            .unwrap_or("0")
            .parse()
            .map_err(|e| anyhow!("bad row count: {e}"))?,
        None => 0,
    };
    let mut total_pages = total_users / PAGE_SIZE;
    if total_users % PAGE_SIZE != 0 {
        total_pages += 1;
    }
    debug!(total_users, total_pages, "user listing");

    let r = tx.exec(
        "select * from auth_user limit 10 offset ?;",
        &[SqlValue::from((page_id - 1) * PAGE_SIZE)],
    )?;
    info!("{}", r.query());
    let users = ORM_USER.convert_to_vector(r.rows())?;

    let mut context = Map::new();
    if let Some(pagination) = pagination_context(total_pages, page_id) {
        context.insert("pagination".to_string(), Value::Object(pagination));
    }
    context.insert(
        "users".to_string(),
        Value::Array(users.into_iter().map(Value::Object).collect()),
    );

    if template_root.is_empty() {
        return context.into_reply();
    }
    if let Some(user) = session.lock().get("user").cloned() {
        context.insert("user".to_string(), user);
    }
    rendering::render(&response, &template_root, "users.html", &context)
}

/// Pagination links around `page_id`: up to three numbered pages on each
/// side, ellipsis markers when pages are skipped, and previous/next when
/// they exist.
fn pagination_context(total_pages: i64, page_id: i64) -> Option<Map<String, Value>> {
    if total_pages == 0 {
        return None;
    }
    let mut pagination = Map::new();
    pagination.insert("total".to_string(), Value::from(total_pages));
    if page_id > 1 {
        pagination.insert("previous".to_string(), Value::from(page_id - 1));
    }
    if page_id < total_pages {
        pagination.insert("next".to_string(), Value::from(page_id + 1));
    }
    let mut lower = page_id - 3;
    let mut upper = page_id + 3;
    if page_id - 3 > 2 {
        pagination.insert("left_ellipsis".to_string(), Value::Bool(true));
    } else {
        lower = 1;
    }
    if page_id + 3 < total_pages - 1 {
        pagination.insert("right_ellipsis".to_string(), Value::Bool(true));
    } else {
        upper = total_pages;
    }
    pagination.insert("current".to_string(), Value::from(page_id));
    pagination.insert(
        "pages_left".to_string(),
        Value::Array((lower..page_id).map(Value::from).collect()),
    );
    pagination.insert(
        "pages_right".to_string(),
        Value::Array((page_id + 1..=upper).map(Value::from).collect()),
    );
    Some(pagination)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(total_users: i64, page_id: i64) -> Map<String, Value> {
        let mut total_pages = total_users / PAGE_SIZE;
        if total_users % PAGE_SIZE != 0 {
            total_pages += 1;
        }
        pagination_context(total_pages, page_id).expect("pagination")
    }

    #[test]
    fn last_of_three_pages() {
        let p = page(27, 3);
        assert_eq!(p.get("total"), Some(&Value::from(3)));
        assert_eq!(p.get("current"), Some(&Value::from(3)));
        assert_eq!(p.get("previous"), Some(&Value::from(2)));
        assert_eq!(p.get("next"), None);
        assert_eq!(p.get("left_ellipsis"), None);
        assert_eq!(p.get("right_ellipsis"), None);
        assert_eq!(p.get("pages_left"), Some(&json!([1, 2])));
        assert_eq!(p.get("pages_right"), Some(&json!([])));
    }

    #[test]
    fn first_of_many_pages() {
        let p = page(200, 1);
        assert_eq!(p.get("total"), Some(&Value::from(20)));
        assert_eq!(p.get("previous"), None);
        assert_eq!(p.get("next"), Some(&Value::from(2)));
        assert_eq!(p.get("left_ellipsis"), None);
        assert_eq!(p.get("right_ellipsis"), Some(&Value::Bool(true)));
        assert_eq!(p.get("pages_left"), Some(&json!([])));
        assert_eq!(p.get("pages_right"), Some(&json!([2, 3, 4])));
    }

    #[test]
    fn middle_page_has_both_ellipses() {
        let p = page(200, 10);
        assert_eq!(p.get("left_ellipsis"), Some(&Value::Bool(true)));
        assert_eq!(p.get("right_ellipsis"), Some(&Value::Bool(true)));
        assert_eq!(p.get("pages_left"), Some(&json!([7, 8, 9])));
        assert_eq!(p.get("pages_right"), Some(&json!([11, 12, 13])));
    }

    #[test]
    fn no_users_no_pagination() {
        assert!(pagination_context(0, 1).is_none());
    }

    #[test]
    fn single_page() {
        let p = page(5, 1);
        assert_eq!(p.get("total"), Some(&Value::from(1)));
        assert_eq!(p.get("previous"), None);
        assert_eq!(p.get("next"), None);
        assert_eq!(p.get("pages_left"), Some(&json!([])));
        assert_eq!(p.get("pages_right"), Some(&json!([])));
    }
}
