//! UniFi controller actuator adapter.
//!
//! Drives one firewall rule on a UniFi controller over its REST API:
//! `Block` enables the rule, `Allow` disables it. Session handling is
//! cookie-based login-on-demand; any expired session or transport failure
//! drops the session flag so the next attempt re-authenticates. The engine
//! treats every failure here uniformly as "actuator unhealthy".
//!
//! Updates are fetch-mutate-PUT: the controller expects the full rule
//! object back, so the adapter reads the current rule, flips `enabled`,
//! and writes it. A rule already in the desired state is a local no-op,
//! which keeps `set_access` idempotent and cheap.

use std::time::Duration;

use log::{debug, info};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde_json::{Value, json};

use crate::app::ports::ActuatorLink;
use crate::config::EngineConfig;
use crate::control::AccessState;
use crate::error::LinkError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(4);

/// UniFi firewall-rule actuator.
pub struct UniFiActuator {
    client: Client,
    base_url: String,
    site: String,
    username: String,
    password: String,
    rule_name: String,
    /// Resolved lazily by name when not configured.
    rule_id: Option<String>,
    logged_in: bool,
}

impl UniFiActuator {
    pub fn from_config(config: &EngineConfig) -> Result<Self, LinkError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .cookie_store(true)
            .danger_accept_invalid_certs(!config.unifi_verify_tls)
            .build()
            .map_err(|e| LinkError::ActuatorRequest(e.to_string()))?;

        Ok(Self {
            client,
            base_url: format!("https://{}:{}", config.unifi_host, config.unifi_port),
            site: config.unifi_site.clone(),
            username: config.unifi_username.clone(),
            password: config.unifi_password.clone(),
            rule_name: config.firewall_rule_name.clone(),
            rule_id: if config.firewall_rule_id.is_empty() {
                None
            } else {
                Some(config.firewall_rule_id.clone())
            },
            logged_in: false,
        })
    }

    // ── Session ───────────────────────────────────────────────

    fn login(&mut self) -> Result<(), LinkError> {
        let url = format!("{}/api/login", self.base_url);
        debug!("controller: logging in at {}", self.base_url);

        let resp = self
            .client
            .post(&url)
            .json(&json!({
                "username": self.username,
                "password": self.password,
            }))
            .send()
            .map_err(|e| {
                self.logged_in = false;
                LinkError::ActuatorAuth(e.to_string())
            })?;

        if resp.status().is_success() {
            self.logged_in = true;
            info!("controller: logged in");
            Ok(())
        } else {
            self.logged_in = false;
            Err(LinkError::ActuatorAuth(format!(
                "login returned {}",
                resp.status()
            )))
        }
    }

    fn ensure_login(&mut self) -> Result<(), LinkError> {
        if self.logged_in {
            return Ok(());
        }
        self.login()
    }

    // ── Rule access ───────────────────────────────────────────

    fn fetch_rules(&mut self) -> Result<Vec<Value>, LinkError> {
        self.ensure_login()?;
        let url = format!("{}/api/s/{}/rest/firewallrule", self.base_url, self.site);

        let resp = self.client.get(&url).send().map_err(|e| {
            self.logged_in = false;
            LinkError::ActuatorRequest(e.to_string())
        })?;

        if resp.status() == StatusCode::UNAUTHORIZED {
            // Session expired: re-authenticate once and retry.
            self.logged_in = false;
            self.login()?;
            let resp = self
                .client
                .get(&url)
                .send()
                .map_err(|e| LinkError::ActuatorRequest(e.to_string()))?;
            return Self::rules_from_response(resp);
        }

        Self::rules_from_response(resp)
    }

    fn rules_from_response(resp: reqwest::blocking::Response) -> Result<Vec<Value>, LinkError> {
        let status = resp.status();
        if !status.is_success() {
            return Err(LinkError::ActuatorRequest(format!(
                "rule listing returned {status}"
            )));
        }
        let body: Value = resp
            .json()
            .map_err(|e| LinkError::ActuatorRequest(e.to_string()))?;
        Ok(body
            .get("data")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    /// Resolve and cache the rule id, looking it up by name when the config
    /// left it empty.
    fn resolve_rule_id(&mut self) -> Result<String, LinkError> {
        if let Some(id) = &self.rule_id {
            return Ok(id.clone());
        }

        let rules = self.fetch_rules()?;
        for rule in &rules {
            if rule_name_matches(rule, &self.rule_name) {
                if let Some(id) = rule_id_of(rule) {
                    info!("controller: resolved rule '{}' to id {}", self.rule_name, id);
                    self.rule_id = Some(id.to_string());
                    return Ok(id.to_string());
                }
            }
        }
        Err(LinkError::RuleNotFound(self.rule_name.clone()))
    }

    fn fetch_rule(&mut self, id: &str) -> Result<Value, LinkError> {
        let rules = self.fetch_rules()?;
        rules
            .into_iter()
            .find(|r| rule_id_of(r) == Some(id))
            .ok_or_else(|| LinkError::RuleNotFound(id.to_string()))
    }
}

impl ActuatorLink for UniFiActuator {
    fn verify(&mut self) -> Result<Option<AccessState>, LinkError> {
        let id = self.resolve_rule_id()?;
        let rule = self.fetch_rule(&id)?;
        let enabled = rule.get("enabled").and_then(Value::as_bool).unwrap_or(false);
        Ok(Some(access_for_rule_enabled(enabled)))
    }

    fn set_access(&mut self, state: AccessState) -> Result<(), LinkError> {
        let id = self.resolve_rule_id()?;
        let mut rule = self.fetch_rule(&id)?;

        let want_enabled = rule_enabled_for(state);
        if rule.get("enabled").and_then(Value::as_bool) == Some(want_enabled) {
            debug!(
                "controller: rule already {} for {}",
                if want_enabled { "enabled" } else { "disabled" },
                state.as_str()
            );
            return Ok(());
        }

        rule["enabled"] = Value::Bool(want_enabled);
        let url = format!(
            "{}/api/s/{}/rest/firewallrule/{}",
            self.base_url, self.site, id
        );
        let resp = self.client.put(&url).json(&rule).send().map_err(|e| {
            self.logged_in = false;
            LinkError::ActuatorRequest(e.to_string())
        })?;

        let status = resp.status();
        if status.is_success() {
            info!(
                "controller: rule {} {} ({})",
                id,
                if want_enabled { "enabled" } else { "disabled" },
                state.as_str()
            );
            Ok(())
        } else {
            if status == StatusCode::UNAUTHORIZED {
                self.logged_in = false;
            }
            Err(LinkError::ActuatorRequest(format!(
                "rule update returned {status}"
            )))
        }
    }
}

// ── Rule helpers ──────────────────────────────────────────────

/// `Block` means the blocking rule is active.
fn rule_enabled_for(state: AccessState) -> bool {
    matches!(state, AccessState::Block)
}

fn access_for_rule_enabled(enabled: bool) -> AccessState {
    if enabled {
        AccessState::Block
    } else {
        AccessState::Allow
    }
}

fn rule_name_matches(rule: &Value, name: &str) -> bool {
    rule.get("name")
        .and_then(Value::as_str)
        .is_some_and(|n| n.eq_ignore_ascii_case(name))
}

fn rule_id_of(rule: &Value) -> Option<&str> {
    rule.get("_id").and_then(Value::as_str)
}
