//! HTTP endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sirocco_bus::BusConnection;
use sirocco_engine::trigger::{CostChangedByPercent, CostReachedLimit};
use sirocco_engine::{
    Portfolio, PortfolioInfo, PortfolioManager, ReferenceCurrency, Trigger, TriggerKind,
    TriggerSettings,
};

use crate::auth::{self, JwtValidator};
use crate::error::ApiError;

/// Shared state of the protected routes.
pub struct ApiState {
    /// The portfolio registry.
    pub manager: Arc<PortfolioManager>,
    /// Token validator.
    pub auth: JwtValidator,
}

impl ApiState {
    /// Creates API state from the manager and the JWT secret.
    #[must_use]
    pub fn new(manager: Arc<PortfolioManager>, jwt_secret: &[u8]) -> Arc<Self> {
        Arc::new(Self {
            manager,
            auth: JwtValidator::new(jwt_secret),
        })
    }
}

/// Builds the JWT-protected portfolio router.
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/portfolios/{name}/data", get(portfolio_data))
        .route("/portfolios/{name}/triggers", post(add_triggers))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ))
        .with_state(state)
}

/// One requested trigger.
#[derive(Debug, Deserialize)]
pub struct AddTriggerRequest {
    /// Type discriminator.
    #[serde(rename = "type")]
    pub kind: TriggerKind,

    /// Target reference currency.
    pub currency: ReferenceCurrency,

    /// Whether a deviation trigger re-arms after firing.
    #[serde(default)]
    pub trailing_alert: bool,

    /// Threshold for `COST_REACHED_LIMIT`.
    #[serde(default)]
    pub limit: Option<Decimal>,

    /// Threshold for `COST_CHANGED_BY_PERCENT`.
    #[serde(default)]
    pub percent: Option<Decimal>,
}

impl AddTriggerRequest {
    /// Validates the request and builds the trigger. Deviation triggers are
    /// anchored at the portfolio's current total.
    fn build(&self, portfolio: &Portfolio) -> Result<Box<dyn Trigger>, ApiError> {
        match self.kind {
            TriggerKind::CostReachedLimit => {
                let limit = self
                    .limit
                    .filter(|limit| *limit > Decimal::ZERO)
                    .ok_or_else(|| {
                        ApiError::BadRequest(format!(
                            "a positive limit is required for {} triggers",
                            self.kind
                        ))
                    })?;
                Ok(Box::new(CostReachedLimit::new(self.currency, limit)))
            }
            TriggerKind::CostChangedByPercent => {
                let percent = self
                    .percent
                    .filter(|percent| *percent > Decimal::ZERO)
                    .ok_or_else(|| {
                        ApiError::BadRequest(format!(
                            "a positive percent is required for {} triggers",
                            self.kind
                        ))
                    })?;
                let anchor = portfolio.total_balance(self.currency);
                Ok(Box::new(CostChangedByPercent::new(
                    self.currency,
                    percent,
                    self.trailing_alert,
                    anchor,
                )))
            }
        }
    }
}

/// GET /portfolios/{name}/data
async fn portfolio_data(
    State(state): State<Arc<ApiState>>,
    Path(name): Path<String>,
) -> Result<Json<PortfolioInfo>, ApiError> {
    let portfolio = state.manager.portfolio(&name)?;
    let info = portfolio.info().await?;
    Ok(Json(info))
}

/// POST /portfolios/{name}/triggers
async fn add_triggers(
    State(state): State<Arc<ApiState>>,
    Path(name): Path<String>,
    Json(requests): Json<Vec<AddTriggerRequest>>,
) -> Result<Json<Vec<TriggerSettings>>, ApiError> {
    let portfolio = state.manager.portfolio(&name)?;

    let mut triggers: Vec<Box<dyn Trigger>> = Vec::with_capacity(requests.len());
    for request in &requests {
        triggers.push(request.build(&portfolio)?);
    }

    let settings = portfolio.add_triggers(triggers).await?;
    Ok(Json(settings))
}

/// Shared state of the health probe.
pub struct HealthState {
    /// Build version string.
    pub version: String,
    /// The broker connection, for connectivity reporting.
    pub bus: Arc<BusConnection>,
}

/// Liveness summary.
#[derive(Debug, Serialize)]
pub struct HealthReport {
    /// `ok` or `degraded`.
    pub status: &'static str,
    /// Build version.
    pub version: String,
    /// Whether the broker session is up.
    pub bus_connected: bool,
}

/// Builds the unauthenticated health router.
pub fn health_router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(state)
}

/// GET /health
async fn health(State(state): State<Arc<HealthState>>) -> Json<HealthReport> {
    let bus_connected = !state.bus.is_closed();
    Json(HealthReport {
        status: if bus_connected { "ok" } else { "degraded" },
        version: state.version.clone(),
        bus_connected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mq::testsupport::{manager_with_account, NAME};
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use rust_decimal_macros::dec;
    use tower::ServiceExt;

    const SECRET: &[u8] = b"test-secret";

    fn bearer() -> String {
        let claims = crate::auth::Claims {
            sub: "client".to_string(),
            exp: usize::try_from(chrono::Utc::now().timestamp() + 3600).unwrap(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap();
        format!("Bearer {token}")
    }

    async fn app() -> Router {
        let manager = manager_with_account();
        manager.add_portfolio(NAME).await.unwrap();
        router(ApiState::new(manager, SECRET))
    }

    #[tokio::test]
    async fn test_data_requires_token() {
        let response = app()
            .await
            .oneshot(
                Request::get(format!("/portfolios/{NAME}/data"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_data_returns_snapshot() {
        let response = app()
            .await
            .oneshot(
                Request::get(format!("/portfolios/{NAME}/data"))
                    .header(header::AUTHORIZATION, bearer())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["data"]["balance"]["total"]["USDT"], "120");
        assert!(json["trigger_settings"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_data_unknown_portfolio_is_400() {
        let response = app()
            .await
            .oneshot(
                Request::get("/portfolios/ghost/data")
                    .header(header::AUTHORIZATION, bearer())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_add_triggers_roundtrip() {
        let body = serde_json::json!([
            { "type": "COST_REACHED_LIMIT", "currency": "USDT", "limit": "500" },
            { "type": "COST_CHANGED_BY_PERCENT", "currency": "USDT", "percent": "5", "trailing_alert": true },
        ]);

        let response = app()
            .await
            .oneshot(
                Request::post(format!("/portfolios/{NAME}/triggers"))
                    .header(header::AUTHORIZATION, bearer())
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let settings: Vec<serde_json::Value> = serde_json::from_slice(&body).unwrap();
        assert_eq!(settings.len(), 2);
        assert_eq!(settings[0]["type"], "COST_REACHED_LIMIT");
        assert_eq!(settings[0]["limit"], "500");
        // The deviation trigger anchors at the portfolio's current total.
        assert_eq!(settings[1]["start_total_cost"], "120");
        assert_eq!(settings[1]["trailing_alert"], true);
    }

    #[tokio::test]
    async fn test_add_triggers_validates_thresholds() {
        for body in [
            serde_json::json!([{ "type": "COST_REACHED_LIMIT", "currency": "USDT" }]),
            serde_json::json!([{ "type": "COST_REACHED_LIMIT", "currency": "USDT", "limit": "0" }]),
            serde_json::json!([{ "type": "COST_CHANGED_BY_PERCENT", "currency": "BTC" }]),
        ] {
            let response = app()
                .await
                .oneshot(
                    Request::post(format!("/portfolios/{NAME}/triggers"))
                        .header(header::AUTHORIZATION, bearer())
                        .header(header::CONTENT_TYPE, "application/json")
                        .body(Body::from(body.to_string()))
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }
    }

    #[tokio::test]
    async fn test_trigger_request_build_anchors_deviation() {
        let manager = manager_with_account();
        manager.add_portfolio(NAME).await.unwrap();
        let portfolio = manager.portfolio(NAME).unwrap();

        let request = AddTriggerRequest {
            kind: TriggerKind::CostChangedByPercent,
            currency: ReferenceCurrency::Usdt,
            trailing_alert: false,
            limit: None,
            percent: Some(dec!(10)),
        };
        let trigger = request.build(&portfolio).unwrap();
        assert_eq!(trigger.settings().start_total_cost, Some(dec!(120)));
    }
}
