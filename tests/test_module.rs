//! End-to-end workflow tests: contract validation, reference rewriting, and
//! the authenticated session working together the way a module invocation
//! composes them.

mod common;

use gcpkit::module::{ArgSpec, ArgType, ModuleArgumentContract};
use gcpkit::params::{extract_field_at_path, navigate, rewrite_at_path_with_callback};
use serde_json::{json, Map, Value};
use wiremock::matchers::{body_json, header, method, path as url_path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{blocking, mount_token_endpoint, write_service_account_key};

#[tokio::test]
async fn test_validated_config_drives_an_authenticated_workflow() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server, "workflow-token").await;
    let (_dir, key_path) = write_service_account_key(&format!("{}/token", server.uri()));

    // The body the API must see: references already collapsed to self-links,
    // names already canonicalized.
    let expected_body = json!({
        "name": "vm-1",
        "disks": [
            {"source": "projects/p/zones/z/disks/d1"},
            {"source": "projects/p/zones/z/disks/d2"}
        ],
        "network": "projects/p/global/networks/default"
    });
    Mock::given(method("POST"))
        .and(url_path("/compute/v1/projects/p/zones/z/instances"))
        .and(header("Authorization", "Bearer workflow-token"))
        .and(header("User-Agent", "Google-Ansible-MM-instance"))
        .and(body_json(expected_body))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "kind": "compute#operation",
            "status": "PENDING"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let uri = server.uri();
    blocking(move || {
        let contract = ModuleArgumentContract::new()
            .with_field("name", ArgSpec::new(ArgType::Str).required())
            .with_field("disks", ArgSpec::new(ArgType::List))
            .with_field("network", ArgSpec::new(ArgType::Str));

        // Raw module input: disk sources arrive as registered API responses,
        // the network arrives as a bare name.
        let config = json!({
            "project": "p",
            "auth_kind": "serviceaccount",
            "service_account_file": key_path.to_str().unwrap(),
            "name": "vm-1",
            "disks": [
                {"source": {"selfLink": "projects/p/zones/z/disks/d1", "id": "101"}},
                {"source": {"selfLink": "projects/p/zones/z/disks/d2", "id": "102"}}
            ],
            "network": "default",
        });

        let resolved = contract.validate(config.as_object().unwrap()).unwrap();

        let mut tree = Value::Object(resolved.params.clone());
        extract_field_at_path(&["disks", "source"], "selfLink", &mut tree);
        rewrite_at_path_with_callback(
            &["network"],
            |value: &Value, enclosing: &Map<String, Value>| {
                let project = enclosing
                    .get("project")
                    .and_then(|p| p.as_str())
                    .unwrap_or_default();
                Value::String(format!(
                    "projects/{project}/global/networks/{}",
                    value.as_str().unwrap_or_default()
                ))
            },
            &mut tree,
        );

        let body = json!({
            "name": tree["name"],
            "disks": tree["disks"],
            "network": tree["network"],
        });

        let session = resolved.session("instance").unwrap();
        let response = session
            .post(
                &format!("{uri}/compute/v1/projects/p/zones/z/instances"),
                Some(&body),
            )
            .unwrap();
        let checked = response.raise_for_status().unwrap();
        let operation = checked.json().unwrap();
        assert_eq!(
            navigate(&operation, &["status"]),
            Some(&json!("PENDING"))
        );
    })
    .await;
}

#[test]
fn test_conflicting_companions_fail_before_resolution_begins() {
    // Both companions set: rejected at contract-validation time; the key
    // file is never opened.
    let contract = ModuleArgumentContract::new();
    let config = json!({
        "project": "p",
        "auth_kind": "serviceaccount",
        "service_account_email": "sa@p.iam.gserviceaccount.com",
        "service_account_file": "/nonexistent/key.json",
    });
    let err = contract.validate(config.as_object().unwrap()).unwrap_err();
    assert!(matches!(
        err,
        gcpkit::errors::GcpError::InvalidConfiguration(_)
    ));
}
