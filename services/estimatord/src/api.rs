use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use estimation_pool::{EstimateError, PoolError, RequestCoordinator};
use hyper::{
    header::{HeaderValue, CONTENT_TYPE},
    service::{make_service_fn, service_fn},
    Body, Method, Request, Response, Server, StatusCode, Uri,
};
use orderbook::TokenId;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use url::form_urlencoded;

const MARKETS_PREFIX: &str = "/api/v1/markets/";
const ESTIMATED_BUY_AMOUNT: &str = "estimated-buy-amount";

#[derive(Debug, PartialEq, Eq)]
enum Route {
    Markets {
        base: TokenId,
        quote: TokenId,
    },
    EstimatedBuyAmount {
        base: TokenId,
        quote: TokenId,
        sell_amount_in_quote: u128,
    },
}

#[derive(Debug, Default, PartialEq, Eq)]
struct QueryParams {
    atoms: bool,
    hops: Option<usize>,
}

#[derive(Debug, Error)]
enum ApiError {
    #[error("not found")]
    NotFound,
    #[error("method not allowed")]
    MethodNotAllowed,
    #[error("{0}")]
    BadRequest(String),
    #[error("only atoms=true is supported")]
    UnitsNotSupported,
    #[error(transparent)]
    Estimate(#[from] EstimateError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::UnitsNotSupported => StatusCode::NOT_IMPLEMENTED,
            ApiError::Estimate(err) => estimate_status(err),
        }
    }
}

fn estimate_status(err: &EstimateError) -> StatusCode {
    match err {
        EstimateError::Pool(PoolError::CapacityExceeded { .. } | PoolError::ShutDown) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        EstimateError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        EstimateError::Pool(_) | EstimateError::MismatchedOutput(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

pub async fn serve(addr: SocketAddr, coordinator: Arc<RequestCoordinator>) -> anyhow::Result<()> {
    let make_svc = make_service_fn(move |_| {
        let coordinator = Arc::clone(&coordinator);
        async move {
            Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                let coordinator = Arc::clone(&coordinator);
                async move { Ok::<_, Infallible>(handle(&coordinator, req).await) }
            }))
        }
    });

    let server = Server::try_bind(&addr)?.serve(make_svc);
    info!(%addr, "price estimation api listening");
    server.await?;
    Ok(())
}

pub async fn handle(coordinator: &RequestCoordinator, req: Request<Body>) -> Response<Body> {
    let (parts, _body) = req.into_parts();
    match route(coordinator, &parts.method, &parts.uri).await {
        Ok(response) => response,
        Err(err) => {
            let status = err.status();
            if status.is_server_error() {
                warn!(
                    path = parts.uri.path(),
                    status = status.as_u16(),
                    error = %err,
                    "request failed"
                );
            }
            json_response(
                status,
                &ErrorBody {
                    message: err.to_string(),
                },
            )
        }
    }
}

async fn route(
    coordinator: &RequestCoordinator,
    method: &Method,
    uri: &Uri,
) -> Result<Response<Body>, ApiError> {
    let route = parse_route(uri.path())?;
    if *method != Method::GET {
        return Err(ApiError::MethodNotAllowed);
    }
    let params = parse_query(uri.query())?;
    if !params.atoms {
        return Err(ApiError::UnitsNotSupported);
    }

    match route {
        Route::Markets { base, quote } => {
            let market = coordinator.markets(base, quote, params.hops).await?;
            Ok(json_response(StatusCode::OK, &market))
        }
        Route::EstimatedBuyAmount {
            base,
            quote,
            sell_amount_in_quote,
        } => {
            let estimate = coordinator
                .estimated_buy_amount(base, quote, sell_amount_in_quote, params.hops)
                .await?;
            Ok(json_response(StatusCode::OK, &estimate))
        }
    }
}

fn parse_route(path: &str) -> Result<Route, ApiError> {
    let rest = path.strip_prefix(MARKETS_PREFIX).ok_or(ApiError::NotFound)?;
    let segments: Vec<&str> = rest.trim_end_matches('/').split('/').collect();
    match segments.as_slice() {
        [pair] => {
            let (base, quote) = parse_pair(pair)?;
            Ok(Route::Markets { base, quote })
        }
        [pair, ESTIMATED_BUY_AMOUNT, amount] => {
            let (base, quote) = parse_pair(pair)?;
            let sell_amount_in_quote = amount
                .parse()
                .map_err(|_| ApiError::BadRequest(format!("invalid sell amount `{amount}`")))?;
            Ok(Route::EstimatedBuyAmount {
                base,
                quote,
                sell_amount_in_quote,
            })
        }
        _ => Err(ApiError::NotFound),
    }
}

fn parse_pair(pair: &str) -> Result<(TokenId, TokenId), ApiError> {
    let invalid =
        || ApiError::BadRequest(format!("invalid market `{pair}`, expected <base>-<quote>"));
    let (base, quote) = pair.split_once('-').ok_or_else(invalid)?;
    Ok((
        base.parse().map_err(|_| invalid())?,
        quote.parse().map_err(|_| invalid())?,
    ))
}

fn parse_query(query: Option<&str>) -> Result<QueryParams, ApiError> {
    let mut params = QueryParams::default();
    for (key, value) in form_urlencoded::parse(query.unwrap_or_default().as_bytes()) {
        match key.as_ref() {
            "atoms" => params.atoms = value == "true",
            "hops" => {
                let hops = value
                    .parse()
                    .map_err(|_| ApiError::BadRequest(format!("invalid hops `{value}`")))?;
                params.hops = Some(hops);
            }
            _ => {}
        }
    }
    Ok(params)
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Body> {
    let (status, bytes) = match serde_json::to_vec(body) {
        Ok(bytes) => (status, bytes),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("{{\"message\":\"failed to encode response: {err}\"}}").into_bytes(),
        ),
    };
    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
