mod common;

use std::time::Duration;

use common::{prescription_json, signed_in};
use mediauth_client::{ClientError, PrescriptionClient};
use mediauth_core::domain::{MedicineDraft, PrescriptionStatus};
use mediauth_core::intake::PrescriptionDraft;
use mediauth_core::ports::{HttpMethod, RequestBody};
use mediauth_core::workflow::{ActionDenied, WorkflowAction};
use serde_json::json;

fn complete_item() -> MedicineDraft {
    MedicineDraft {
        medicine_name: "Amoxicillin".to_string(),
        dosage: "500mg".to_string(),
        frequency: "three times daily".to_string(),
        duration: "7 days".to_string(),
        quantity: Some(21),
        instructions: "After meals".to_string(),
    }
}

fn draft(items: Vec<MedicineDraft>) -> PrescriptionDraft {
    PrescriptionDraft {
        patient_id: Some(10),
        diagnosis: "Strep throat".to_string(),
        notes: String::new(),
        items,
    }
}

#[tokio::test]
async fn listing_fills_the_board() {
    let h = signed_in("doctor").await;
    h.transport.on(
        HttpMethod::Get,
        "/prescriptions/",
        200,
        json!({"count": 2, "next": null, "previous": null,
               "results": [prescription_json(1, "draft"), prescription_json(2, "issued")]}),
    );
    let client = PrescriptionClient::new(h.session.clone());

    let listed = client.list().await.unwrap();

    assert_eq!(listed.len(), 2);
    let board = client.board();
    assert_eq!(board.find(2).unwrap().status, PrescriptionStatus::Issued);
    assert_eq!(board.find(1).unwrap().reference, "RX0001");
}

#[tokio::test]
async fn create_without_complete_items_is_never_sent() {
    let h = signed_in("doctor").await;
    let client = PrescriptionClient::new(h.session.clone());
    let mut half = complete_item();
    half.dosage = "  ".to_string();

    let err = client.create(&draft(vec![half])).await.unwrap_err();
    assert!(matches!(err, ClientError::Validation(ref e) if e.field == "items[0].dosage"));

    let err = client.create(&draft(vec![])).await.unwrap_err();
    assert!(matches!(err, ClientError::Validation(ref e) if e.field == "items"));

    assert_eq!(h.transport.count(HttpMethod::Post, "/prescriptions/"), 0);
}

#[tokio::test]
async fn create_drops_incomplete_lines_and_shows_the_result() {
    let h = signed_in("doctor").await;
    h.transport.on(HttpMethod::Post, "/prescriptions/", 201, prescription_json(7, "draft"));
    let client = PrescriptionClient::new(h.session.clone());
    let blank = MedicineDraft::default();

    let created = client
        .create(&draft(vec![blank, complete_item()]))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(created.status, PrescriptionStatus::Draft);
    assert!(client.board().find(7).is_some());

    let sent = h.transport.last(HttpMethod::Post, "/prescriptions/").unwrap();
    match sent.body {
        RequestBody::Json(body) => {
            assert_eq!(body["patient_id"], 10);
            assert_eq!(body["items"].as_array().unwrap().len(), 1);
            assert_eq!(body["items"][0]["medicine_name"], "Amoxicillin");
        }
        other => panic!("expected a JSON body, got {other:?}"),
    }
}

#[tokio::test]
async fn acknowledged_create_relists_the_board() {
    let h = signed_in("doctor").await;
    h.transport.on(
        HttpMethod::Post,
        "/prescriptions/",
        201,
        json!({"patient_id": 10, "diagnosis": "Strep throat", "notes": "", "items": []}),
    );
    h.transport.on(HttpMethod::Get, "/prescriptions/", 200, json!([prescription_json(8, "draft")]));
    let client = PrescriptionClient::new(h.session.clone());

    assert_eq!(client.create(&draft(vec![complete_item()])).await.unwrap(), None);
    assert!(client.board().find(8).is_some());
}

#[tokio::test]
async fn patients_cannot_create_prescriptions() {
    let h = signed_in("patient").await;
    let client = PrescriptionClient::new(h.session.clone());

    let err = client.create(&draft(vec![complete_item()])).await.unwrap_err();

    assert!(matches!(err, ClientError::Denied(ActionDenied::WrongRole { .. })));
    assert!(h.transport.last(HttpMethod::Post, "/prescriptions/").is_none());
}

#[tokio::test]
async fn issue_replaces_the_local_copy() {
    let h = signed_in("doctor").await;
    h.transport.on(HttpMethod::Get, "/prescriptions/", 200, json!([prescription_json(5, "draft")]));
    let mut issued = prescription_json(5, "issued");
    issued["issued_date"] = json!("2024-05-02T10:00:00Z");
    h.transport.on(HttpMethod::Post, "/prescriptions/5/issue/", 200, issued);
    let client = PrescriptionClient::new(h.session.clone());
    client.list().await.unwrap();
    assert_eq!(client.actions_for(5).len(), 3);

    let result = client.issue(5).await.unwrap();

    assert_eq!(result.status, PrescriptionStatus::Issued);
    assert!(result.issued_at.is_some());
    assert_eq!(client.board().find(5).unwrap().status, PrescriptionStatus::Issued);
    assert!(client.actions_for(5).is_empty());
}

#[tokio::test]
async fn issue_of_a_known_non_draft_is_refused_locally() {
    let h = signed_in("doctor").await;
    h.transport.on(HttpMethod::Get, "/prescriptions/", 200, json!([prescription_json(5, "filled")]));
    let client = PrescriptionClient::new(h.session.clone());
    client.list().await.unwrap();

    let err = client.issue(5).await.unwrap_err();

    assert!(matches!(
        err,
        ClientError::Denied(ActionDenied::WrongStatus {
            action: WorkflowAction::IssuePrescription,
            status: PrescriptionStatus::Filled,
        })
    ));
    assert_eq!(h.transport.count(HttpMethod::Post, "/prescriptions/5/issue/"), 0);
    assert_eq!(client.board().find(5).unwrap().status, PrescriptionStatus::Filled);
}

#[tokio::test]
async fn server_precondition_failure_leaves_the_board_alone() {
    let h = signed_in("doctor").await;
    // Our copy still says draft, but someone else already issued it.
    h.transport.on(HttpMethod::Get, "/prescriptions/", 200, json!([prescription_json(5, "draft")]));
    h.transport.on(
        HttpMethod::Post,
        "/prescriptions/5/issue/",
        400,
        json!({"error": "Only draft prescriptions can be issued"}),
    );
    let client = PrescriptionClient::new(h.session.clone());
    client.list().await.unwrap();
    let before = client.board();

    let err = client.issue(5).await.unwrap_err();

    assert!(matches!(
        err,
        ClientError::Rejected { status: 400, ref message } if message == "Only draft prescriptions can be issued"
    ));
    assert_eq!(client.board(), before);
    assert_eq!(h.transport.count(HttpMethod::Post, "/prescriptions/5/issue/"), 1);
}

#[tokio::test]
async fn doctors_cannot_fill() {
    let h = signed_in("doctor").await;
    let client = PrescriptionClient::new(h.session.clone());

    let err = client.fill(3).await.unwrap_err();

    assert!(matches!(err, ClientError::Denied(ActionDenied::WrongRole { .. })));
    assert!(h.transport.last(HttpMethod::Post, "/prescriptions/3/fill/").is_none());
}

#[tokio::test]
async fn pharmacist_fills_an_issued_prescription() {
    let h = signed_in("pharmacist").await;
    h.transport.on(HttpMethod::Get, "/prescriptions/", 200, json!([prescription_json(4, "issued")]));
    h.transport.on(HttpMethod::Post, "/prescriptions/4/fill/", 200, prescription_json(4, "filled"));
    let client = PrescriptionClient::new(h.session.clone());
    client.list().await.unwrap();

    let filled = client.fill(4).await.unwrap();

    assert_eq!(filled.status, PrescriptionStatus::Filled);
    assert_eq!(client.board().find(4).unwrap().status, PrescriptionStatus::Filled);
}

#[tokio::test]
async fn server_forbidden_is_surfaced() {
    let h = signed_in("pharmacist").await;
    h.transport.on(
        HttpMethod::Post,
        "/prescriptions/9/fill/",
        403,
        json!({"error": "Only pharmacists can fill prescriptions"}),
    );
    let client = PrescriptionClient::new(h.session.clone());

    let err = client.fill(9).await.unwrap_err();

    assert!(matches!(err, ClientError::Forbidden(_)));
    assert!(client.board().prescriptions.is_empty());
}

#[tokio::test]
async fn missing_prescription_is_dropped_from_the_board() {
    let h = signed_in("doctor").await;
    h.transport.on(HttpMethod::Get, "/prescriptions/", 200, json!([prescription_json(6, "draft")]));
    h.transport.on(HttpMethod::Get, "/prescriptions/6/", 404, json!({"detail": "Not found."}));
    let client = PrescriptionClient::new(h.session.clone());
    client.list().await.unwrap();

    let err = client.get(6).await.unwrap_err();

    assert!(matches!(err, ClientError::NotFound(_)));
    assert!(client.board().find(6).is_none());
}

#[tokio::test]
async fn deleting_a_vanished_draft_succeeds() {
    let h = signed_in("doctor").await;
    h.transport.on(HttpMethod::Get, "/prescriptions/", 200, json!([prescription_json(6, "draft")]));
    h.transport.on(HttpMethod::Delete, "/prescriptions/6/", 404, json!({"detail": "Not found."}));
    let client = PrescriptionClient::new(h.session.clone());
    client.list().await.unwrap();

    client.delete(6).await.unwrap();

    assert!(client.board().prescriptions.is_empty());
}

#[tokio::test]
async fn a_listing_started_during_a_delete_is_discarded() {
    let h = signed_in("doctor").await;
    h.transport.on(HttpMethod::Get, "/prescriptions/", 200, json!([prescription_json(6, "draft")]));
    h.transport.on_delayed(
        HttpMethod::Get,
        "/prescriptions/",
        Duration::from_millis(100),
        200,
        json!([prescription_json(6, "draft")]),
    );
    h.transport.on_delayed(
        HttpMethod::Delete,
        "/prescriptions/6/",
        Duration::from_millis(20),
        204,
        serde_json::Value::Null,
    );
    let client = PrescriptionClient::new(h.session.clone());
    client.list().await.unwrap();

    let relist = async {
        tokio::time::sleep(Duration::from_millis(5)).await;
        client.list().await
    };
    let (deleted, listed) = tokio::join!(client.delete(6), relist);

    deleted.unwrap();
    assert_eq!(listed.unwrap().len(), 1);
    assert!(client.board().find(6).is_none());
}

#[tokio::test]
async fn an_unexpected_transition_answer_still_wins() {
    let h = signed_in("doctor").await;
    h.transport.on(HttpMethod::Get, "/prescriptions/", 200, json!([prescription_json(5, "draft")]));
    h.transport.on(
        HttpMethod::Post,
        "/prescriptions/5/issue/",
        200,
        prescription_json(5, "cancelled"),
    );
    let client = PrescriptionClient::new(h.session.clone());
    client.list().await.unwrap();

    let result = client.issue(5).await.unwrap();

    assert_eq!(result.status, PrescriptionStatus::Cancelled);
    assert_eq!(client.board().find(5).unwrap().status, PrescriptionStatus::Cancelled);
    assert!(client.actions_for(5).is_empty());
}

#[tokio::test]
async fn updates_are_sent_as_full_replacements() {
    let h = signed_in("doctor").await;
    h.transport.on(HttpMethod::Get, "/prescriptions/", 200, json!([prescription_json(5, "draft")]));
    let mut updated = prescription_json(5, "draft");
    updated["diagnosis"] = json!("Strep throat");
    h.transport.on(HttpMethod::Put, "/prescriptions/5/", 200, updated);
    let client = PrescriptionClient::new(h.session.clone());
    client.list().await.unwrap();

    let result = client.update(5, &draft(vec![complete_item()])).await.unwrap();

    assert_eq!(result.diagnosis, "Strep throat");
    assert_eq!(client.board().find(5).unwrap().diagnosis, "Strep throat");
}

#[tokio::test]
async fn doctors_can_look_up_patients() {
    let h = signed_in("doctor").await;
    h.transport.on(
        HttpMethod::Get,
        "/prescriptions/patients/",
        200,
        json!([{"id": 10, "username": "patient10", "first_name": "", "last_name": "", "user_type": "patient"}]),
    );
    let client = PrescriptionClient::new(h.session.clone());

    let patients = client.patients().await.unwrap();

    assert_eq!(patients.len(), 1);
    assert_eq!(patients[0].display_name(), "patient10");
}
