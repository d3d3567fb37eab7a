use crate::features::subscriptions::{
    self, CreateSubscriptionDto, ErrorResponse, UpdateSubscriptionDto,
};
use crate::shared::errors::{AppError, AppResult, ErrorSeverity};
use crate::AppState;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::header::{HeaderValue, ALLOW, CONTENT_TYPE};
use hyper::{Method, Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::convert::Infallible;
use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Instant;

/// 受け付けるリクエストボディの上限（4MiB）
pub const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// ボディ読み込み時のエラー型
type BoxError = Box<dyn StdError + Send + Sync>;

/// パスから判定したルート
#[derive(Debug, PartialEq, Eq)]
enum Route<'a> {
    /// `/subscriptions` と `/subscriptions/`
    Subscriptions,
    /// `/subscriptions/{id}`
    Subscription(&'a str),
    Stats,
    Health,
    Unknown,
}

impl<'a> Route<'a> {
    fn resolve(path: &'a str) -> Self {
        match path {
            "/subscriptions" | "/subscriptions/" => Route::Subscriptions,
            "/stats" => Route::Stats,
            "/health" => Route::Health,
            _ => match path.strip_prefix("/subscriptions/") {
                Some(id) if !id.is_empty() && !id.contains('/') => Route::Subscription(id),
                _ => Route::Unknown,
            },
        }
    }

    /// ルートが受け付けるメソッド（405のAllowヘッダー用）
    fn allowed_methods(&self) -> &'static str {
        match self {
            Route::Subscriptions => "GET, POST",
            Route::Subscription(_) => "GET, PATCH, DELETE",
            Route::Stats | Route::Health => "GET",
            Route::Unknown => "",
        }
    }
}

/// ハンドラーの処理結果
enum Reply {
    Json(StatusCode, String),
    NoContent,
    MethodNotAllowed(&'static str),
}

/// HTTPリクエストを処理する
///
/// エラーはすべて `{"code", "message"}` 形式のレスポンスに変換するため、失敗しない。
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
) -> Result<Response<String>, Infallible>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let started = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = match dispatch(req, &state).await {
        Ok(reply) => reply_to_response(reply),
        Err(error) => error_response(&error),
    };

    log::info!(
        "{} {} -> {} ({:?})",
        method,
        path,
        response.status().as_u16(),
        started.elapsed()
    );

    Ok(response)
}

/// メソッドとパスに応じてコマンドを呼び出す
async fn dispatch<B>(req: Request<B>, state: &AppState) -> AppResult<Reply>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().unwrap_or("").to_string();
    let route = Route::resolve(&path);

    match (&method, &route) {
        (&Method::GET, Route::Subscriptions) => {
            let items = subscriptions::get_subscriptions(state, &query)?;
            json_reply(StatusCode::OK, &items)
        }
        (&Method::POST, Route::Subscriptions) => {
            let dto: CreateSubscriptionDto = read_json(req).await?;
            let created = subscriptions::create_subscription(state, dto)?;
            json_reply(StatusCode::OK, &created)
        }
        (&Method::GET, Route::Subscription(id)) => {
            let id = subscriptions::parse_subscription_id(id)?;
            let item = subscriptions::get_subscription(state, id)?;
            json_reply(StatusCode::OK, &item)
        }
        (&Method::PATCH, Route::Subscription(id)) => {
            let id = subscriptions::parse_subscription_id(id)?;
            let dto: UpdateSubscriptionDto = read_json(req).await?;
            subscriptions::update_subscription(state, id, dto)?;
            Ok(Reply::NoContent)
        }
        (&Method::DELETE, Route::Subscription(id)) => {
            let id = subscriptions::parse_subscription_id(id)?;
            subscriptions::delete_subscription(state, id)?;
            Ok(Reply::NoContent)
        }
        (&Method::GET, Route::Stats) => {
            let stats = subscriptions::get_subscription_stats(state, &query)?;
            json_reply(StatusCode::OK, &stats)
        }
        (&Method::GET, Route::Health) => {
            json_reply(StatusCode::OK, &serde_json::json!({ "status": "ok" }))
        }
        (_, Route::Unknown) => Err(AppError::not_found(format!("route {path}"))),
        (_, route) => Ok(Reply::MethodNotAllowed(route.allowed_methods())),
    }
}

/// リクエストボディをJSONとして読み込む
async fn read_json<B, T>(req: Request<B>) -> AppResult<T>
where
    B: Body,
    B::Error: Into<BoxError>,
    T: DeserializeOwned,
{
    let body = Limited::new(req.into_body(), MAX_BODY_BYTES)
        .collect()
        .await
        .map_err(|e| {
            if e.downcast_ref::<LengthLimitError>().is_some() {
                AppError::PayloadTooLarge(format!(
                    "request body exceeds {MAX_BODY_BYTES} bytes"
                ))
            } else {
                AppError::validation(format!("failed to read request body: {e}"))
            }
        })?
        .to_bytes();

    Ok(serde_json::from_slice(&body)?)
}

fn json_reply<T: Serialize>(status: StatusCode, value: &T) -> AppResult<Reply> {
    Ok(Reply::Json(status, serde_json::to_string(value)?))
}

fn reply_to_response(reply: Reply) -> Response<String> {
    match reply {
        Reply::Json(status, body) => json_response(status, body),
        Reply::NoContent => {
            let mut response = Response::new(String::new());
            *response.status_mut() = StatusCode::NO_CONTENT;
            response
        }
        Reply::MethodNotAllowed(allowed) => {
            let mut response = error_body(StatusCode::METHOD_NOT_ALLOWED, "method not allowed");
            response
                .headers_mut()
                .insert(ALLOW, HeaderValue::from_static(allowed));
            response
        }
    }
}

/// エラーをレスポンスに変換する（内部エラーの詳細はログにだけ出す）
fn error_response(error: &AppError) -> Response<String> {
    match error.severity() {
        ErrorSeverity::High => log::error!("リクエスト処理エラー: {}", error.details()),
        ErrorSeverity::Medium | ErrorSeverity::Low => {
            log::warn!("リクエストを拒否しました: {}", error.details())
        }
    }

    error_body(error.status_code(), error.user_message())
}

fn error_body(status: StatusCode, message: &str) -> Response<String> {
    let body = ErrorResponse {
        code: status.as_u16(),
        message: message.to_string(),
    };

    // 文字列と数値だけの構造体なのでシリアライズは失敗しない
    let body = serde_json::to_string(&body)
        .unwrap_or_else(|_| format!(r#"{{"code":{},"message":"error"}}"#, status.as_u16()));

    json_response(status, body)
}

fn json_response(status: StatusCode, body: String) -> Response<String> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/json; charset=utf-8"),
    );
    response
}
