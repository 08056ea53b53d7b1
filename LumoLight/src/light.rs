//! Définition du device BinaryLight de démonstration.

use std::sync::Arc;

use lumoconfig::Config;
use lumoupnp::{DeviceDefinition, DeviceError, DeviceIcon, EventingManager, ServiceDefinition};

use crate::switch_power::SwitchPowerHandler;
use crate::switch_power_desc::SWITCH_POWER_SCPD;

const DEFAULT_ICON: &[u8] = include_bytes!("../assets/icon.png");

/// Construit la définition du device lumière avec son service SwitchPower.
///
/// Retourne aussi le handler concret, pour que l'application puisse piloter
/// le statut effectif (simulation de l'actionneur).
pub fn light_device(
    config: &Config,
    eventing: Arc<EventingManager>,
) -> Result<(DeviceDefinition, Arc<SwitchPowerHandler>), DeviceError> {
    let mut definition = DeviceDefinition::new(
        "urn:schemas-upnp-org:device:BinaryLight:1",
        config.get_friendly_name(),
        config.get_manufacturer(),
        config.get_model_name(),
    );

    let handler = Arc::new(SwitchPowerHandler::new(eventing));
    definition.add_service(ServiceDefinition::new(
        "urn:schemas-upnp-org:service:SwitchPower:1",
        "urn:upnp-org:serviceId:SwitchPower:1",
        "/evt/SwitchPower",
        SWITCH_POWER_SCPD,
        Arc::clone(&handler) as Arc<dyn lumoupnp::ServiceHandler>,
    ))?;

    for size in [48u32, 128] {
        definition.add_icon(DeviceIcon {
            width: size,
            height: size,
            depth: 8,
            mimetype: "image/png".to_string(),
            bytes: DEFAULT_ICON.to_vec(),
        });
    }

    Ok((definition, handler))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        let dir = std::env::temp_dir().join(format!("lumolight-test-{}", std::process::id()));
        Config::load_config(dir.to_str().unwrap()).unwrap()
    }

    #[test]
    fn test_light_device_definition() {
        let (definition, _switch) =
            light_device(&test_config(), Arc::new(EventingManager::new())).unwrap();

        assert_eq!(
            definition.device_type(),
            "urn:schemas-upnp-org:device:BinaryLight:1"
        );
        assert_eq!(definition.services().len(), 1);
        assert_eq!(definition.icons().len(), 2);
        assert!(definition.udn().starts_with("uuid:"));
    }

    #[test]
    fn test_udn_is_stable_across_builds() {
        let config = test_config();
        let (a, _) = light_device(&config, Arc::new(EventingManager::new())).unwrap();
        let (b, _) = light_device(&config, Arc::new(EventingManager::new())).unwrap();
        assert_eq!(a.udn(), b.udn());
    }

    /// Scénario complet sur le device réel, via HTTP.
    #[tokio::test]
    async fn test_switch_power_scenario_over_http() {
        use lumoupnp::soap::build_soap_request;
        use lumoupnp::{HostConfig, UpnpHost};
        use std::time::Duration;

        const URN: &str = "urn:schemas-upnp-org:service:SwitchPower:1";

        let eventing = Arc::new(EventingManager::new());
        let (definition, switch) = light_device(&test_config(), Arc::clone(&eventing)).unwrap();
        let config = HostConfig {
            http_port: 0,
            interface: Some("no-such-interface-0".to_string()),
            notify_interval: Duration::from_secs(1),
            ..HostConfig::default()
        };
        let mut host = UpnpHost::start(definition, eventing, config).await.unwrap();
        let base = format!("http://127.0.0.1:{}", host.local_addr().port());

        let client = reqwest::Client::new();
        let post = |action: &'static str, args: &'static [(&'static str, &'static str)]| {
            let client = client.clone();
            let base = base.clone();
            async move {
                client
                    .post(format!("{}/ctl", base))
                    .header("SOAPACTION", format!("\"{}#{}\"", URN, action))
                    .body(build_soap_request(URN, action, args).unwrap())
                    .send()
                    .await
                    .unwrap()
                    .text()
                    .await
                    .unwrap()
            }
        };

        // SetTarget(true) puis GetTarget => true
        post("SetTarget", &[("NewTargetValue", "true")]).await;
        let body = post("GetTarget", &[]).await;
        assert!(body.contains("<RetTargetValue>1</RetTargetValue>"));

        // GetStatus reste sur la valeur en cache, indépendante de la cible
        let body = post("GetStatus", &[]).await;
        assert!(body.contains("<ResultStatus>0</ResultStatus>"));

        // L'actionneur applique la cible : le statut suit
        switch.apply_target();
        let body = post("GetStatus", &[]).await;
        assert!(body.contains("<ResultStatus>1</ResultStatus>"));

        // Le SCPD servi est exactement le document configuré
        let scpd = reqwest::get(format!("{}/scpd/SwitchPower.xml", base))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(scpd, crate::switch_power_desc::SWITCH_POWER_SCPD);

        host.close().await;
    }
}
