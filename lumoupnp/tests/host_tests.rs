//! Tests d'intégration du plan de contrôle HTTP.
//!
//! Le host est démarré sur un port éphémère, sans interface SSDP (filtre
//! sur un nom inexistant), et exercé de l'extérieur avec reqwest.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lumoupnp::soap::build_soap_request;
use lumoupnp::{
    ActionArgs, ActionResults, DeviceDefinition, EventingManager, HandlerError, HostConfig,
    RequestContext, ServiceDefinition, ServiceHandler, UpnpHost,
};

const SWITCH_URN: &str = "urn:schemas-upnp-org:service:SwitchPower:1";
const TEST_SCPD: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<scpd xmlns="urn:schemas-upnp-org:service-1-0">
  <specVersion>
    <major>1</major>
    <minor>0</minor>
  </specVersion>
</scpd>
"#;

struct SwitchHandler {
    state: Mutex<(bool, bool)>,
}

impl SwitchHandler {
    fn new() -> Self {
        Self {
            state: Mutex::new((false, false)),
        }
    }
}

fn bool_num(b: bool) -> &'static str {
    if b { "1" } else { "0" }
}

#[async_trait]
impl ServiceHandler for SwitchHandler {
    async fn handle(
        &self,
        action: &str,
        args: &ActionArgs,
        _ctx: &RequestContext,
    ) -> Result<ActionResults, HandlerError> {
        match action {
            "GetStatus" => {
                let (status, _) = *self.state.lock().unwrap();
                Ok(vec![("ResultStatus".to_string(), bool_num(status).into())])
            }
            "GetTarget" => {
                let (_, target) = *self.state.lock().unwrap();
                Ok(vec![("RetTargetValue".to_string(), bool_num(target).into())])
            }
            "SetTarget" => {
                let raw = args.get("NewTargetValue").ok_or_else(|| {
                    HandlerError::InvalidArgumentValue("missing NewTargetValue".to_string())
                })?;
                let value = match raw.trim() {
                    "1" | "true" => true,
                    "0" | "false" => false,
                    other => {
                        return Err(HandlerError::InvalidArgumentValue(format!(
                            "not a boolean: {}",
                            other
                        )));
                    }
                };
                self.state.lock().unwrap().1 = value;
                Ok(vec![])
            }
            _ => Err(HandlerError::InvalidAction(action.to_string())),
        }
    }
}

fn test_definition() -> DeviceDefinition {
    let mut def = DeviceDefinition::new(
        "urn:schemas-upnp-org:device:BinaryLight:1",
        "Test light",
        "LumoLight",
        "LumoLight 1",
    );
    def.add_service(ServiceDefinition::new(
        SWITCH_URN,
        "urn:upnp-org:serviceId:SwitchPower:1",
        "/evt/SwitchPower",
        TEST_SCPD,
        Arc::new(SwitchHandler::new()),
    ))
    .unwrap();
    def
}

fn test_config() -> HostConfig {
    HostConfig {
        http_port: 0,
        interface: Some("no-such-interface-0".to_string()),
        notify_interval: Duration::from_secs(1),
        ..HostConfig::default()
    }
}

async fn start_test_host(config: HostConfig) -> (UpnpHost, String) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let host = UpnpHost::start(test_definition(), Arc::new(EventingManager::new()), config)
        .await
        .unwrap();
    let base = format!("http://127.0.0.1:{}", host.local_addr().port());
    (host, base)
}

async fn post_action(base: &str, urn: &str, action: &str, args: &[(&str, &str)]) -> reqwest::Response {
    let body = build_soap_request(urn, action, args).unwrap();
    reqwest::Client::new()
        .post(format!("{}/ctl", base))
        .header("SOAPACTION", format!("\"{}#{}\"", urn, action))
        .header("Content-Type", "text/xml; charset=\"utf-8\"")
        .body(body)
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_root_descriptor_is_served_and_stable() {
    let (mut host, base) = start_test_host(test_config()).await;

    let url = format!("{}/rootDesc.xml", base);
    let first = reqwest::get(&url).await.unwrap();
    assert_eq!(first.status(), 200);
    assert_eq!(
        first.headers().get("content-type").unwrap(),
        "text/xml; charset=\"utf-8\""
    );
    assert!(first.headers().contains_key("server"));
    assert!(first.headers().contains_key("ext"));

    let first_body = first.text().await.unwrap();
    let second_body = reqwest::get(&url).await.unwrap().text().await.unwrap();
    assert_eq!(first_body, second_body);

    // Le document est bien formé et décrit le device.
    let root = xmltree::Element::parse(first_body.as_bytes()).unwrap();
    let device = root.get_child("device").unwrap();
    assert_eq!(
        device.get_child("friendlyName").unwrap().get_text().unwrap(),
        "Test light"
    );

    host.close().await;
}

#[tokio::test]
async fn test_scpd_served_byte_exact() {
    let (mut host, base) = start_test_host(test_config()).await;

    let resp = reqwest::get(format!("{}/scpd/SwitchPower.xml", base))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), TEST_SCPD);

    host.close().await;
}

#[tokio::test]
async fn test_unknown_service_returns_invalid_service_fault() {
    let (mut host, base) = start_test_host(test_config()).await;

    let resp = post_action(
        &base,
        "urn:schemas-upnp-org:service:NoSuchService:1",
        "GetStatus",
        &[],
    )
    .await;
    assert_eq!(resp.status(), 500);
    let body = resp.text().await.unwrap();
    assert!(body.contains("<errorCode>404</errorCode>"));
    assert!(body.contains("Invalid Service"));

    host.close().await;
}

#[tokio::test]
async fn test_unknown_action_returns_invalid_action_fault() {
    let (mut host, base) = start_test_host(test_config()).await;

    let resp = post_action(&base, SWITCH_URN, "NoSuchAction", &[]).await;
    assert_eq!(resp.status(), 500);
    let body = resp.text().await.unwrap();
    assert!(body.contains("<errorCode>401</errorCode>"));

    host.close().await;
}

#[tokio::test]
async fn test_malformed_envelope_returns_invalid_args_fault() {
    let (mut host, base) = start_test_host(test_config()).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/ctl", base))
        .header("SOAPACTION", format!("\"{}#GetStatus\"", SWITCH_URN))
        .body("this is not xml <<<")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);
    let body = resp.text().await.unwrap();
    assert!(body.contains("<errorCode>402</errorCode>"));

    host.close().await;
}

#[tokio::test]
async fn test_missing_soapaction_header_is_bad_request() {
    let (mut host, base) = start_test_host(test_config()).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/ctl", base))
        .body("<whatever/>")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    host.close().await;
}

#[tokio::test]
async fn test_set_then_get_target_round_trip() {
    let (mut host, base) = start_test_host(test_config()).await;

    let resp = post_action(&base, SWITCH_URN, "SetTarget", &[("NewTargetValue", "1")]).await;
    assert_eq!(resp.status(), 200);
    assert!(resp.text().await.unwrap().contains("SetTargetResponse"));

    let resp = post_action(&base, SWITCH_URN, "GetTarget", &[]).await;
    assert_eq!(resp.status(), 200);
    let body = resp.text().await.unwrap();
    assert!(body.contains("<RetTargetValue>1</RetTargetValue>"));

    // Status n'est pas affecté par la cible.
    let resp = post_action(&base, SWITCH_URN, "GetStatus", &[]).await;
    let body = resp.text().await.unwrap();
    assert!(body.contains("<ResultStatus>0</ResultStatus>"));

    host.close().await;
}

#[tokio::test]
async fn test_subscribe_renew_unsubscribe_lifecycle() {
    let (mut host, base) = start_test_host(test_config()).await;
    let client = reqwest::Client::new();
    let subscribe = reqwest::Method::from_bytes(b"SUBSCRIBE").unwrap();
    let unsubscribe = reqwest::Method::from_bytes(b"UNSUBSCRIBE").unwrap();
    let event_url = format!("{}/evt/SwitchPower", base);

    // Nouvelle souscription
    let resp = client
        .request(subscribe.clone(), &event_url)
        .header("CALLBACK", "<http://127.0.0.1:9/cb>")
        .header("NT", "upnp:event")
        .header("TIMEOUT", "Second-300")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let sid = resp.headers().get("sid").unwrap().to_str().unwrap().to_string();
    assert!(sid.starts_with("uuid:"));
    assert_eq!(resp.headers().get("timeout").unwrap(), "Second-300");

    // Deux souscriptions => deux SIDs distincts
    let resp = client
        .request(subscribe.clone(), &event_url)
        .header("CALLBACK", "<http://127.0.0.1:9/cb>")
        .header("NT", "upnp:event")
        .send()
        .await
        .unwrap();
    let other_sid = resp.headers().get("sid").unwrap().to_str().unwrap().to_string();
    assert_ne!(sid, other_sid);

    // Renouvellement
    let resp = client
        .request(subscribe.clone(), &event_url)
        .header("SID", &sid)
        .header("TIMEOUT", "Second-600")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers().get("timeout").unwrap(), "Second-600");

    // Annulation puis renouvellement refusé
    let resp = client
        .request(unsubscribe, &event_url)
        .header("SID", &sid)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .request(subscribe, &event_url)
        .header("SID", &sid)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 412);

    host.close().await;
}

#[tokio::test]
async fn test_subscribe_without_callback_is_rejected() {
    let (mut host, base) = start_test_host(test_config()).await;

    let resp = reqwest::Client::new()
        .request(
            reqwest::Method::from_bytes(b"SUBSCRIBE").unwrap(),
            format!("{}/evt/SwitchPower", base),
        )
        .header("NT", "upnp:event")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 412);

    host.close().await;
}

#[tokio::test]
async fn test_allow_list_rejects_outside_clients() {
    let config = HostConfig {
        allowed_ips: "203.0.113.0/24".to_string(),
        ..test_config()
    };
    let (mut host, base) = start_test_host(config).await;

    let resp = reqwest::get(format!("{}/rootDesc.xml", base)).await.unwrap();
    assert_eq!(resp.status(), 403);

    host.close().await;
}

#[tokio::test]
async fn test_close_shuts_down_listener() {
    let (mut host, base) = start_test_host(test_config()).await;
    host.close().await;

    let result = reqwest::Client::new()
        .get(format!("{}/rootDesc.xml", base))
        .timeout(Duration::from_secs(1))
        .send()
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_concurrent_set_target_is_consistent() {
    let (mut host, base) = start_test_host(test_config()).await;

    let mut tasks = Vec::new();
    for i in 0..100 {
        let base = base.clone();
        tasks.push(tokio::spawn(async move {
            let value = if i % 2 == 0 { "1" } else { "0" };
            let resp =
                post_action(&base, SWITCH_URN, "SetTarget", &[("NewTargetValue", value)]).await;
            assert_eq!(resp.status(), 200);
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    // L'état final est l'une des valeurs soumises, jamais une valeur corrompue.
    let resp = post_action(&base, SWITCH_URN, "GetTarget", &[]).await;
    let body = resp.text().await.unwrap();
    assert!(
        body.contains("<RetTargetValue>1</RetTargetValue>")
            || body.contains("<RetTargetValue>0</RetTargetValue>")
    );

    host.close().await;
}
