//! Gestion des abonnements aux événements (GENA).
//!
//! Le gestionnaire possède exclusivement la table des abonnements :
//! SUBSCRIBE crée une entrée, SUBSCRIBE-avec-SID la renouvelle, UNSUBSCRIBE
//! la retire, et l'expiration la purge paresseusement. Les services signalent
//! eux-mêmes leurs changements via [`EventingManager::notify`] ; le
//! gestionnaire se contente de diffuser.
//!
//! La livraison est best-effort : un callback injoignable est journalisé et
//! n'affecte ni les autres abonnés ni le plan de contrôle. Pas de file de
//! retry.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use quick_xml::escape::escape;
use thiserror::Error;
use tracing::{debug, error, info};

/// Durée accordée par défaut à un abonnement.
pub const DEFAULT_SUBSCRIPTION: Duration = Duration::from_secs(1800);

/// Erreurs du gestionnaire d'événements.
#[derive(Error, Debug)]
pub enum EventingError {
    /// SID inconnu ou expiré
    #[error("Unknown subscription: {0}")]
    UnknownSid(String),
}

#[derive(Debug, Clone)]
struct Subscription {
    service_key: String,
    callback: String,
    seq: u32,
    expires: Instant,
}

/// Gestionnaire d'abonnements et de notifications GENA.
pub struct EventingManager {
    subscriptions: RwLock<HashMap<String, Subscription>>,
    http: reqwest::Client,
}

impl EventingManager {
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            http: reqwest::Client::new(),
        }
    }

    /// Crée un abonnement et retourne (SID, durée accordée).
    ///
    /// Le SID est unique sur toute la vie du gestionnaire ; le compteur de
    /// séquence repart à 0 pour chaque nouvel abonnement.
    pub fn subscribe(
        &self,
        service_key: &str,
        callback: &str,
        requested: Option<Duration>,
    ) -> (String, Duration) {
        let granted = requested.unwrap_or(DEFAULT_SUBSCRIPTION);
        let sid = format!("uuid:{}", uuid::Uuid::new_v4());
        let callback = callback
            .trim()
            .trim_matches(|c| c == '<' || c == '>')
            .to_string();

        let mut subscriptions = self.subscriptions.write().unwrap();
        subscriptions.insert(
            sid.clone(),
            Subscription {
                service_key: service_key.to_string(),
                callback: callback.clone(),
                seq: 0,
                expires: Instant::now() + granted,
            },
        );
        info!(
            "🔒 New subscription: SID={}, Callback={}, Timeout={}s",
            sid,
            callback,
            granted.as_secs()
        );
        (sid, granted)
    }

    /// Renouvelle un abonnement existant et retourne la durée accordée.
    pub fn renew(&self, sid: &str, requested: Option<Duration>) -> Result<Duration, EventingError> {
        let granted = requested.unwrap_or(DEFAULT_SUBSCRIPTION);
        let mut subscriptions = self.subscriptions.write().unwrap();

        let subscription = subscriptions
            .get_mut(sid)
            .ok_or_else(|| EventingError::UnknownSid(sid.to_string()))?;

        if subscription.expires <= Instant::now() {
            subscriptions.remove(sid);
            return Err(EventingError::UnknownSid(sid.to_string()));
        }

        subscription.expires = Instant::now() + granted;
        info!("♻️ Renewed SID {} for {}s", sid, granted.as_secs());
        Ok(granted)
    }

    /// Retire un abonnement.
    pub fn unsubscribe(&self, sid: &str) -> Result<(), EventingError> {
        let mut subscriptions = self.subscriptions.write().unwrap();
        subscriptions
            .remove(sid)
            .map(|_| info!("❌ Unsubscribe SID={}", sid))
            .ok_or_else(|| EventingError::UnknownSid(sid.to_string()))
    }

    /// Notifie tous les abonnés vivants d'un service.
    ///
    /// Les numéros de séquence sont attribués sous verrou : strictement
    /// croissants par abonnement, à partir de 0. La livraison part ensuite
    /// dans des tâches détachées (fire-and-forget).
    pub fn notify(&self, service_key: &str, changes: &[(String, String)]) {
        if changes.is_empty() {
            return;
        }
        let body = property_set(changes);

        let deliveries: Vec<(String, String, u32)> = {
            let mut subscriptions = self.subscriptions.write().unwrap();
            let now = Instant::now();
            subscriptions.retain(|sid, s| {
                if s.expires <= now {
                    debug!("Subscription {} expired, dropping", sid);
                    false
                } else {
                    true
                }
            });

            subscriptions
                .iter_mut()
                .filter(|(_, s)| s.service_key == service_key)
                .map(|(sid, s)| {
                    let seq = s.seq;
                    s.seq += 1;
                    (sid.clone(), s.callback.clone(), seq)
                })
                .collect()
        };

        for (sid, callback, seq) in deliveries {
            self.send_notify(sid, callback, seq, body.clone());
        }
    }

    /// Notifie un unique abonné, identifié par son SID.
    ///
    /// Utilisé pour l'événement initial qui suit un SUBSCRIBE.
    pub fn notify_subscriber(&self, sid: &str, changes: &[(String, String)]) {
        if changes.is_empty() {
            return;
        }

        let delivery = {
            let mut subscriptions = self.subscriptions.write().unwrap();
            subscriptions.get_mut(sid).map(|s| {
                let seq = s.seq;
                s.seq += 1;
                (s.callback.clone(), seq)
            })
        };

        if let Some((callback, seq)) = delivery {
            self.send_notify(sid.to_string(), callback, seq, property_set(changes));
        }
    }

    /// Nombre d'abonnements vivants pour un service.
    pub fn subscriber_count(&self, service_key: &str) -> usize {
        let now = Instant::now();
        self.subscriptions
            .read()
            .unwrap()
            .values()
            .filter(|s| s.service_key == service_key && s.expires > now)
            .count()
    }

    fn send_notify(&self, sid: String, callback: String, seq: u32, body: String) {
        let client = self.http.clone();
        tokio::spawn(async move {
            match client
                .request(reqwest::Method::from_bytes(b"NOTIFY").unwrap(), &callback)
                .header("Content-Type", "text/xml; charset=\"utf-8\"")
                .header("NT", "upnp:event")
                .header("NTS", "upnp:propchange")
                .header("SID", &sid)
                .header("SEQ", seq.to_string())
                .body(body)
                .send()
                .await
            {
                Ok(resp) => {
                    debug!(
                        "✅ Notified subscriber {} (SEQ={}, status={})",
                        callback,
                        seq,
                        resp.status()
                    );
                }
                Err(e) => {
                    error!("Failed to notify subscriber {}: {}", callback, e);
                }
            }
        });
    }
}

impl Default for EventingManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse un en-tête GENA `TIMEOUT: Second-{n}`.
///
/// `infinite` et les valeurs illisibles retombent sur la durée par défaut
/// (retour `None`).
pub fn parse_timeout_header(value: &str) -> Option<Duration> {
    let v = value.trim();
    let secs = v
        .strip_prefix("Second-")
        .or_else(|| v.strip_prefix("second-"))?;
    secs.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Formate une durée accordée en valeur d'en-tête `TIMEOUT`.
pub fn format_timeout(granted: Duration) -> String {
    format!("Second-{}", granted.as_secs())
}

fn property_set(changes: &[(String, String)]) -> String {
    let mut body = r#"<e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0">"#.to_string();
    for (name, value) in changes {
        body.push_str(&format!(
            "<e:property><{0}>{1}</{0}></e:property>",
            name,
            escape(value.as_str())
        ));
    }
    body.push_str("</e:propertyset>");
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_change(value: &str) -> Vec<(String, String)> {
        vec![("Status".to_string(), value.to_string())]
    }

    #[tokio::test]
    async fn test_two_subscriptions_get_distinct_sids() {
        let manager = EventingManager::new();
        let (sid_a, _) = manager.subscribe("SwitchPower", "http://127.0.0.1:1/cb", None);
        let (sid_b, _) = manager.subscribe("SwitchPower", "http://127.0.0.1:1/cb", None);
        assert_ne!(sid_a, sid_b);
        assert_eq!(manager.subscriber_count("SwitchPower"), 2);
    }

    #[tokio::test]
    async fn test_default_granted_duration() {
        let manager = EventingManager::new();
        let (_, granted) = manager.subscribe("SwitchPower", "http://127.0.0.1:1/cb", None);
        assert_eq!(granted, DEFAULT_SUBSCRIPTION);
    }

    #[tokio::test]
    async fn test_renew_unknown_sid_fails() {
        let manager = EventingManager::new();
        let err = manager.renew("uuid:no-such-sid", None).unwrap_err();
        assert!(matches!(err, EventingError::UnknownSid(_)));
    }

    #[tokio::test]
    async fn test_unsubscribe_removes_subscription() {
        let manager = EventingManager::new();
        let (sid, _) = manager.subscribe("SwitchPower", "http://127.0.0.1:1/cb", None);
        manager.unsubscribe(&sid).unwrap();
        assert_eq!(manager.subscriber_count("SwitchPower"), 0);
        assert!(manager.unsubscribe(&sid).is_err());
    }

    #[tokio::test]
    async fn test_expired_subscription_is_purged_on_notify() {
        let manager = EventingManager::new();
        let (sid, _) = manager.subscribe(
            "SwitchPower",
            "http://127.0.0.1:1/cb",
            Some(Duration::ZERO),
        );
        manager.notify("SwitchPower", &status_change("1"));
        assert_eq!(manager.subscriber_count("SwitchPower"), 0);
        assert!(manager.renew(&sid, None).is_err());
    }

    #[tokio::test]
    async fn test_callback_angle_brackets_are_trimmed() {
        let manager = EventingManager::new();
        let (sid, _) = manager.subscribe("SwitchPower", "<http://127.0.0.1:1/cb>", None);
        let subscriptions = manager.subscriptions.read().unwrap();
        assert_eq!(subscriptions[&sid].callback, "http://127.0.0.1:1/cb");
    }

    #[test]
    fn test_parse_timeout_header() {
        assert_eq!(
            parse_timeout_header("Second-1800"),
            Some(Duration::from_secs(1800))
        );
        assert_eq!(
            parse_timeout_header("second-60"),
            Some(Duration::from_secs(60))
        );
        assert_eq!(parse_timeout_header("infinite"), None);
        assert_eq!(parse_timeout_header(""), None);
    }

    #[test]
    fn test_format_timeout() {
        assert_eq!(format_timeout(Duration::from_secs(1800)), "Second-1800");
    }

    #[test]
    fn test_property_set_escapes_values() {
        let body = property_set(&[("Status".to_string(), "a<b&c".to_string())]);
        assert!(body.contains("<e:property><Status>a&lt;b&amp;c</Status></e:property>"));
        assert!(body.starts_with(r#"<e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0">"#));
    }
}
