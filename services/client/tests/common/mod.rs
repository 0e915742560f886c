//! Shared fixtures: a scripted `HttpTransport` and JSON builders for server payloads.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mediauth_client::adapters::MemoryTokenStore;
use mediauth_client::SessionManager;
use mediauth_core::domain::CredentialPair;
use mediauth_core::ports::{
    ApiRequest, ApiResponse, HttpMethod, HttpTransport, PortError, PortResult,
};
use serde_json::{json, Value};
use tokio::sync::Notify;

type Handler = Arc<dyn Fn(&ApiRequest) -> PortResult<ApiResponse> + Send + Sync>;

#[derive(Clone)]
struct Step {
    delay: Duration,
    gate: Option<Arc<Notify>>,
    handler: Handler,
}

/// Answers requests from per-route queues. The last step of a queue repeats.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, VecDeque<Step>>>,
    sent: Mutex<Vec<ApiRequest>>,
}

fn route_key(method: HttpMethod, path: &str) -> String {
    format!("{method} {path}")
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push(&self, method: HttpMethod, path: &str, step: Step) {
        self.routes
            .lock()
            .unwrap()
            .entry(route_key(method, path))
            .or_default()
            .push_back(step);
    }

    pub fn on(&self, method: HttpMethod, path: &str, status: u16, body: Value) {
        self.on_delayed(method, path, Duration::ZERO, status, body);
    }

    pub fn on_delayed(&self, method: HttpMethod, path: &str, delay: Duration, status: u16, body: Value) {
        self.push(
            method,
            path,
            Step {
                delay,
                gate: None,
                handler: Arc::new(move |_| Ok(ApiResponse::new(status, body.clone()))),
            },
        );
    }

    /// Holds the response back until `gate` is notified.
    pub fn on_gated(&self, method: HttpMethod, path: &str, gate: Arc<Notify>, status: u16, body: Value) {
        self.push(
            method,
            path,
            Step {
                delay: Duration::ZERO,
                gate: Some(gate),
                handler: Arc::new(move |_| Ok(ApiResponse::new(status, body.clone()))),
            },
        );
    }

    pub fn on_with<F>(&self, method: HttpMethod, path: &str, delay: Duration, handler: F)
    where
        F: Fn(&ApiRequest) -> PortResult<ApiResponse> + Send + Sync + 'static,
    {
        self.push(
            method,
            path,
            Step {
                delay,
                gate: None,
                handler: Arc::new(handler),
            },
        );
    }

    pub fn fail(&self, method: HttpMethod, path: &str, message: &str) {
        let message = message.to_string();
        self.on_with(method, path, Duration::ZERO, move |_| {
            Err(PortError::Network(message.clone()))
        });
    }

    pub fn sent(&self) -> Vec<ApiRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub fn count(&self, method: HttpMethod, path: &str) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }

    pub fn last(&self, method: HttpMethod, path: &str) -> Option<ApiRequest> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|r| r.method == method && r.path == path)
            .cloned()
    }

    fn next_step(&self, key: &str) -> Option<Step> {
        let mut routes = self.routes.lock().unwrap();
        let queue = routes.get_mut(key)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: &ApiRequest) -> PortResult<ApiResponse> {
        self.sent.lock().unwrap().push(request.clone());
        let key = route_key(request.method, &request.path);
        let step = self
            .next_step(&key)
            .ok_or_else(|| PortError::Unexpected(format!("unscripted request {key}")))?;

        if let Some(gate) = &step.gate {
            gate.notified().await;
        }
        if !step.delay.is_zero() {
            tokio::time::sleep(step.delay).await;
        }
        (step.handler)(request)
    }
}

//=========================================================================================
// Wiring
//=========================================================================================

pub struct Harness {
    pub transport: Arc<ScriptedTransport>,
    pub tokens: Arc<MemoryTokenStore>,
    pub session: SessionManager,
}

pub fn harness() -> Harness {
    let transport = ScriptedTransport::new();
    let tokens = Arc::new(MemoryTokenStore::new());
    let session = SessionManager::new(transport.clone(), tokens.clone());
    Harness {
        transport,
        tokens,
        session,
    }
}

/// A harness whose session is already signed in as `role`, with tokens `a1`/`r1`.
pub async fn signed_in(role: &str) -> Harness {
    let h = harness();
    h.transport.on(
        HttpMethod::Post,
        "/users/login/",
        200,
        json!({"access": "a1", "refresh": "r1"}),
    );
    h.transport.on(HttpMethod::Get, "/users/profile/", 200, user_json(1, role));
    h.session
        .login(&mediauth_core::domain::Credentials {
            username: "user".to_string(),
            password: "secret".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(
        mediauth_core::ports::TokenStore::load(h.tokens.as_ref()).unwrap(),
        Some(CredentialPair::new("a1", "r1"))
    );
    h
}

//=========================================================================================
// Payloads
//=========================================================================================

pub fn user_json(id: i64, role: &str) -> Value {
    json!({
        "id": id,
        "username": format!("{role}{id}"),
        "first_name": "Ann",
        "last_name": "Smith",
        "email": format!("{role}{id}@example.com"),
        "user_type": role,
        "phone_number": null,
        "license_number": null,
    })
}

fn summary_json(id: i64, role: &str) -> Value {
    json!({
        "id": id,
        "username": format!("{role}{id}"),
        "first_name": "Ann",
        "last_name": "Smith",
        "user_type": role,
    })
}

pub fn prescription_json(id: i64, status: &str) -> Value {
    json!({
        "id": id,
        "prescription_id": format!("RX{id:04}"),
        "patient": summary_json(10, "patient"),
        "doctor": summary_json(1, "doctor"),
        "diagnosis": "Seasonal flu",
        "notes": "",
        "items": [{
            "medicine_name": "Oseltamivir",
            "dosage": "75mg",
            "frequency": "twice daily",
            "duration": "5 days",
            "quantity": 10,
            "instructions": null,
        }],
        "status": status,
        "created_at": "2024-05-01T09:00:00Z",
        "updated_at": "2024-05-01T09:00:00Z",
        "issued_date": null,
        "filled_by": null,
        "filled_date": null,
    })
}

pub fn upload_json(id: i64, status: &str) -> Value {
    let parsed = if status == "completed" {
        json!({
            "patient_name": "Ann Smith",
            "doctor_name": "Dr. Jones",
            "diagnosis": "Seasonal flu",
            "medicines": [{
                "medicine_name": "Oseltamivir",
                "dosage": "75mg",
                "frequency": "twice daily",
                "duration": "5 days",
            }],
        })
    } else {
        json!({})
    };
    json!({
        "id": id,
        "image": format!("/media/prescriptions/{id}.png"),
        "original_filename": format!("scan-{id}.png"),
        "status": status,
        "extracted_text": if status == "completed" { "Oseltamivir 75mg" } else { "" },
        "parsed_data": parsed,
        "uploaded_at": "2024-05-01T09:00:00Z",
        "processed_at": null,
    })
}
