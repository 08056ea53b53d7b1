//! Plan de contrôle HTTP du device.
//!
//! Quatre familles de routes : le descripteur racine, un document SCPD par
//! service, le endpoint de contrôle SOAP partagé, et un endpoint
//! SUBSCRIBE/UNSUBSCRIBE par service. Un middleware commun appose les
//! en-têtes d'identification, consulte la liste blanche et journalise les
//! requêtes en mode diagnostic.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{ConnectInfo, Path, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{any, get, post},
};
use tracing::{debug, info, warn};

use crate::allowlist::{IpNet, ip_allowed};
use crate::device::{DeviceDefinition, DeviceError, RequestContext, service_key};
use crate::eventing::{EventingManager, format_timeout, parse_timeout_header};
use crate::router::ActionRouter;
use crate::soap::{
    SoapFault, build_soap_response, error_codes, parse_soap_action, parse_soap_action_header,
};
use crate::{CONTROL_PATH, DEVICE_ICON_PATH, ROOT_DESC_PATH};

const XML_CONTENT_TYPE: &str = "text/xml; charset=\"utf-8\"";

/// Options du plan de contrôle.
pub struct HostOptions {
    /// Valeur de l'en-tête `Server`
    pub server_field: String,

    /// Miroir des requêtes vers le flux de diagnostic
    pub log_headers: bool,

    /// Retarde les réponses SUBSCRIBE jusqu'à l'abandon du client
    pub stall_event_subscribe: bool,

    /// Blocs d'adresses clientes admises
    pub allowed_nets: Vec<IpNet>,
}

/// État partagé par tous les handlers HTTP.
#[derive(Clone)]
pub struct HostState {
    pub definition: Arc<DeviceDefinition>,
    pub root_desc: Arc<Vec<u8>>,
    pub router: Arc<ActionRouter>,
    pub eventing: Arc<EventingManager>,
    pub options: Arc<HostOptions>,
}

/// Construit le routeur Axum complet du plan de contrôle.
pub fn build_router(state: HostState) -> Result<Router, DeviceError> {
    let mut app: Router<HostState> = Router::new()
        .route(ROOT_DESC_PATH, get(root_desc_handler))
        .route(CONTROL_PATH, post(control_handler))
        .route(
            &format!("{}/{{index}}", DEVICE_ICON_PATH),
            get(device_icon_handler),
        );

    for service in state.definition.services() {
        let scpd = service.scpd().to_string();
        app = app.route(
            &service.scpd_path()?,
            get(move || {
                let scpd = scpd.clone();
                async move {
                    (
                        StatusCode::OK,
                        [(header::CONTENT_TYPE, XML_CONTENT_TYPE)],
                        scpd,
                    )
                }
            }),
        );

        let key = service_key(service.service_type())?;
        app = app.route(
            service.event_path(),
            any(
                move |State(state): State<HostState>, headers: HeaderMap, request: Request| {
                    let key = key.clone();
                    async move { event_sub_handler(state, key, headers, request).await }
                },
            ),
        );
    }

    let app = app
        .layer(middleware::from_fn_with_state(
            state.clone(),
            request_middleware,
        ))
        .with_state(state);

    Ok(app)
}

/// Middleware commun : liste blanche, journal diagnostic, en-têtes fixes.
async fn request_middleware(
    State(state): State<HostState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    if !ip_allowed(&state.options.allowed_nets, &peer.ip()) {
        warn!("Rejected request from {} (not in allow list)", peer);
        return StatusCode::FORBIDDEN.into_response();
    }

    if state.options.log_headers {
        info!("{} {}", request.method(), request.uri());
        for (name, value) in request.headers() {
            info!("  {}: {:?}", name, value);
        }
    }

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        HeaderName::from_static("ext"),
        HeaderValue::from_static(""),
    );
    if let Ok(server) = HeaderValue::from_str(&state.options.server_field) {
        headers.insert(header::SERVER, server);
    }
    response
}

async fn root_desc_handler(State(state): State<HostState>) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, XML_CONTENT_TYPE)],
        state.root_desc.as_ref().clone(),
    )
        .into_response()
}

async fn device_icon_handler(
    State(state): State<HostState>,
    Path(index): Path<usize>,
) -> Response {
    match state.definition.icons().get(index) {
        Some(icon) => {
            let content_type = HeaderValue::from_str(&icon.mimetype)
                .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, content_type)],
                icon.bytes.clone(),
            )
                .into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

fn xml_response(status: StatusCode, body: String) -> Response {
    (status, [(header::CONTENT_TYPE, XML_CONTENT_TYPE)], body).into_response()
}

/// Handler du endpoint de contrôle SOAP partagé.
///
/// Le service visé vient de l'en-tête `SOAPACTION`, les arguments du corps
/// de l'enveloppe. Réponse 200 avec enveloppe de résultat, ou 500 avec
/// enveloppe de fault.
async fn control_handler(
    State(state): State<HostState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let soap_action_value = match headers.get("SOAPACTION").and_then(|v| v.to_str().ok()) {
        Some(value) => value,
        None => {
            return (StatusCode::BAD_REQUEST, "Missing SOAPACTION header").into_response();
        }
    };

    let (service_urn, action) = match parse_soap_action_header(soap_action_value) {
        Ok(parsed) => parsed,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    let soap_action = match parse_soap_action(body.as_bytes()) {
        Ok(action) => action,
        Err(e) => {
            debug!("❌ Failed to parse SOAP envelope: {}", e);
            let fault = SoapFault::with_upnp_error(
                "s:Client",
                "Invalid SOAP request",
                error_codes::INVALID_ARGS,
                "The SOAP request could not be parsed",
            );
            return xml_response(StatusCode::INTERNAL_SERVER_ERROR, fault.to_envelope());
        }
    };

    debug!("🎬 Control request: {}#{}", service_urn, action);

    let ctx = RequestContext { peer: Some(peer) };
    match state
        .router
        .dispatch(&service_urn, &action, &soap_action.args, &ctx)
        .await
    {
        Ok(values) => match build_soap_response(&service_urn, &action, values) {
            Ok(xml) => xml_response(StatusCode::OK, xml),
            Err(e) => {
                warn!("Failed to build SOAP response: {}", e);
                let fault = SoapFault::with_upnp_error(
                    "s:Server",
                    "Action Failed",
                    error_codes::ACTION_FAILED,
                    "Failed to build SOAP response",
                );
                xml_response(StatusCode::INTERNAL_SERVER_ERROR, fault.to_envelope())
            }
        },
        Err(fault) => xml_response(StatusCode::INTERNAL_SERVER_ERROR, fault.to_envelope()),
    }
}

/// Handler des abonnements aux événements (SUBSCRIBE/UNSUBSCRIBE).
///
/// - `SUBSCRIBE` sans SID : nouvelle souscription
/// - `SUBSCRIBE` avec SID : renouvellement
/// - `UNSUBSCRIBE` : annulation
async fn event_sub_handler(
    state: HostState,
    service_key: String,
    headers: HeaderMap,
    request: Request,
) -> Response {
    let method = request.method().as_str().to_string();
    let sid = header_str(&headers, "SID");
    let timeout = header_str(&headers, "TIMEOUT");
    let callback = header_str(&headers, "CALLBACK");
    let nt = header_str(&headers, "NT");

    info!("📡 Event {} request for {}", method, service_key);

    match method.as_str() {
        "SUBSCRIBE" => {
            if sid.is_empty() {
                if !nt.is_empty() && nt != "upnp:event" {
                    return StatusCode::PRECONDITION_FAILED.into_response();
                }
                let Some(callback_url) = parse_callback(&callback) else {
                    return StatusCode::PRECONDITION_FAILED.into_response();
                };

                if state.options.stall_event_subscribe {
                    // Contournement explicite pour clients défaillants : la
                    // réponse n'est jamais rendue, la tâche meurt quand le
                    // client coupe la connexion.
                    info!("🧱 Stalling SUBSCRIBE for {} until client disconnect", service_key);
                    std::future::pending::<()>().await;
                }

                let requested = parse_timeout_header(&timeout);
                let (new_sid, granted) =
                    state.eventing.subscribe(&service_key, &callback_url, requested);

                // Événement initial porteur de l'état courant (SEQ 0).
                if let Some(handler) = state.router.handler(&service_key) {
                    let eventing = Arc::clone(&state.eventing);
                    let sid_for_initial = new_sid.clone();
                    tokio::spawn(async move {
                        if let Some(props) = handler.evented_state().await {
                            eventing.notify_subscriber(&sid_for_initial, &props);
                        }
                    });
                }

                subscription_response(&new_sid, granted)
            } else {
                match state.eventing.renew(&sid, parse_timeout_header(&timeout)) {
                    Ok(granted) => subscription_response(&sid, granted),
                    Err(_) => StatusCode::PRECONDITION_FAILED.into_response(),
                }
            }
        }
        "UNSUBSCRIBE" => match state.eventing.unsubscribe(&sid) {
            Ok(()) => StatusCode::OK.into_response(),
            Err(_) => StatusCode::PRECONDITION_FAILED.into_response(),
        },
        _ => {
            warn!("Unsupported event method: {}", method);
            StatusCode::METHOD_NOT_ALLOWED.into_response()
        }
    }
}

fn subscription_response(sid: &str, granted: std::time::Duration) -> Response {
    let sid_value = match HeaderValue::from_str(sid) {
        Ok(value) => value,
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };
    let timeout_value = match HeaderValue::from_str(&format_timeout(granted)) {
        Ok(value) => value,
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };
    (
        StatusCode::OK,
        [
            (HeaderName::from_static("sid"), sid_value),
            (HeaderName::from_static("timeout"), timeout_value),
        ],
    )
        .into_response()
}

fn header_str(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string()
}

/// Valide l'URL de callback d'un SUBSCRIBE (chevrons tolérés).
fn parse_callback(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_matches(|c| c == '<' || c == '>');
    if trimmed.is_empty() {
        return None;
    }
    let parsed = url::Url::parse(trimmed).ok()?;
    if parsed.scheme() != "http" {
        return None;
    }
    Some(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_callback_accepts_bracketed_http_url() {
        assert_eq!(
            parse_callback("<http://192.168.1.50:3400/notify>"),
            Some("http://192.168.1.50:3400/notify".to_string())
        );
    }

    #[test]
    fn test_parse_callback_rejects_non_http() {
        assert_eq!(parse_callback("ftp://192.168.1.50/notify"), None);
        assert_eq!(parse_callback(""), None);
        assert_eq!(parse_callback("not a url"), None);
    }
}
