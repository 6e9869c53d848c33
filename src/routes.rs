use actix::Addr;
use actix_web::{delete, get, post, web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::auth::SessionGate;
use crate::errors::{ApiError, SessionError};
use crate::schemas::{NewFriend, NewPayment, NewSubscription};
use crate::session::{
    Connect, Disconnect, GetSession, SessionManager, SessionSnapshot, TakeNotices,
};
use crate::store::CollectionStore;

pub struct AppState {
    pub store: CollectionStore,
    pub session: Addr<SessionManager>,
    pub gate: SessionGate,
}

type Reply = Result<HttpResponse, ApiError>;

impl AppState {
    async fn authorize(&self, request: &HttpRequest) -> Result<String, ApiError> {
        self.gate.check(request, &self.session).await
    }
}

#[derive(Deserialize, Serialize)]
struct MemberEmailJson {
    email: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConnectedJson {
    #[serde(flatten)]
    session: SessionSnapshot,
    token: String,
}

pub fn configure(config: &mut web::ServiceConfig) {
    config
        .service(health)
        .service(get_session)
        .service(connect_session)
        .service(disconnect_session)
        .service(take_notices)
        .service(list_subscriptions)
        .service(add_subscription)
        .service(remove_subscription)
        .service(add_member)
        .service(remove_member)
        .service(record_payment)
        .service(list_friends)
        .service(add_friend)
        .service(remove_friend)
        .service(friend_subscriptions)
        .service(pending_payments)
        .service(payment_history)
        .service(log_payment);
}

#[get("/health")]
async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

#[get("/session")]
async fn get_session(state: web::Data<AppState>) -> Reply {
    let snapshot = state
        .session
        .send(GetSession)
        .await
        .map_err(|_| SessionError::Unavailable)?;
    Ok(HttpResponse::Ok().json(snapshot))
}

#[post("/session/connect")]
async fn connect_session(state: web::Data<AppState>) -> Reply {
    let session = state
        .session
        .send(Connect)
        .await
        .map_err(|_| SessionError::Unavailable)??;
    let token = session
        .public_key
        .as_deref()
        .map(|public_key| state.gate.token_for(public_key))
        .unwrap_or_default();
    Ok(HttpResponse::Ok().json(ConnectedJson { session, token }))
}

#[post("/session/disconnect")]
async fn disconnect_session(state: web::Data<AppState>) -> Reply {
    let snapshot = state
        .session
        .send(Disconnect)
        .await
        .map_err(|_| SessionError::Unavailable)??;
    Ok(HttpResponse::Ok().json(snapshot))
}

#[get("/session/notices")]
async fn take_notices(state: web::Data<AppState>) -> Reply {
    let notices = state
        .session
        .send(TakeNotices)
        .await
        .map_err(|_| SessionError::Unavailable)?;
    Ok(HttpResponse::Ok().json(notices))
}

#[get("/subscriptions")]
async fn list_subscriptions(request: HttpRequest, state: web::Data<AppState>) -> Reply {
    state.authorize(&request).await?;
    Ok(HttpResponse::Ok().json(state.store.snapshot().subscriptions))
}

#[post("/subscriptions")]
async fn add_subscription(
    request: HttpRequest,
    state: web::Data<AppState>,
    json: web::Json<NewSubscription>,
) -> Reply {
    state.authorize(&request).await?;
    let subscription = state.store.add_subscription(json.into_inner()).await;
    Ok(HttpResponse::Created().json(subscription))
}

#[delete("/subscriptions/{id}")]
async fn remove_subscription(
    request: HttpRequest,
    state: web::Data<AppState>,
    id: web::Path<String>,
) -> Reply {
    state.authorize(&request).await?;
    let removed = state.store.remove_subscription(&id).await;
    Ok(HttpResponse::Ok().json(json!({ "removed": removed })))
}

#[post("/subscriptions/{id}/members")]
async fn add_member(
    request: HttpRequest,
    state: web::Data<AppState>,
    id: web::Path<String>,
    json: web::Json<MemberEmailJson>,
) -> Reply {
    state.authorize(&request).await?;
    state
        .store
        .add_friend_to_subscription(&id, &json.email)
        .await;
    Ok(HttpResponse::Ok().json(state.store.snapshot().subscriptions))
}

#[delete("/subscriptions/{id}/members/{member_id}")]
async fn remove_member(
    request: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Reply {
    state.authorize(&request).await?;
    let (id, member_id) = path.into_inner();
    state
        .store
        .remove_friend_from_subscription(&id, &member_id)
        .await;
    Ok(HttpResponse::Ok().json(state.store.snapshot().subscriptions))
}

#[post("/subscriptions/{id}/members/{member_id}/payment")]
async fn record_payment(
    request: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Reply {
    state.authorize(&request).await?;
    let (id, member_id) = path.into_inner();
    let item = state.store.record_payment(&id, &member_id).await;
    Ok(HttpResponse::Ok().json(item))
}

#[get("/friends")]
async fn list_friends(request: HttpRequest, state: web::Data<AppState>) -> Reply {
    state.authorize(&request).await?;
    Ok(HttpResponse::Ok().json(state.store.snapshot().friends))
}

#[post("/friends")]
async fn add_friend(
    request: HttpRequest,
    state: web::Data<AppState>,
    json: web::Json<NewFriend>,
) -> Reply {
    state.authorize(&request).await?;
    let friend = state.store.add_friend(json.into_inner()).await;
    Ok(HttpResponse::Created().json(friend))
}

#[delete("/friends/{id}")]
async fn remove_friend(
    request: HttpRequest,
    state: web::Data<AppState>,
    id: web::Path<String>,
) -> Reply {
    state.authorize(&request).await?;
    let removed = state.store.remove_friend(&id).await;
    Ok(HttpResponse::Ok().json(json!({ "removed": removed })))
}

#[get("/friends/{id}/subscriptions")]
async fn friend_subscriptions(
    request: HttpRequest,
    state: web::Data<AppState>,
    id: web::Path<String>,
) -> Reply {
    state.authorize(&request).await?;
    Ok(HttpResponse::Ok().json(state.store.friend_subscription_names(&id)))
}

#[get("/payments/pending")]
async fn pending_payments(request: HttpRequest, state: web::Data<AppState>) -> Reply {
    state.authorize(&request).await?;
    Ok(HttpResponse::Ok().json(state.store.pending_payments()))
}

#[get("/payments/history")]
async fn payment_history(request: HttpRequest, state: web::Data<AppState>) -> Reply {
    state.authorize(&request).await?;
    Ok(HttpResponse::Ok().json(state.store.snapshot().payment_history))
}

#[post("/payments/history")]
async fn log_payment(
    request: HttpRequest,
    state: web::Data<AppState>,
    json: web::Json<NewPayment>,
) -> Reply {
    state.authorize(&request).await?;
    let item = state.store.log_payment(json.into_inner()).await;
    Ok(HttpResponse::Created().json(item))
}
