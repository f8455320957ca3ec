mod helpers;

use helpers::{fixture_path, load_fixture, raw_fixture, RequestBuilder};
use rbac_engine::{filter, load_document, Action, CompileOptions, RbacFilter, RbacResult};
use std::collections::HashMap;

fn denied_by(name: &str) -> RbacResult {
    RbacResult {
        allowed: false,
        matched_policy_name: name.to_string(),
    }
}

fn allowed_by_default() -> RbacResult {
    RbacResult {
        allowed: true,
        matched_policy_name: String::new(),
    }
}

#[test]
fn test_filter_fixture_table() {
    struct Case {
        name: &'static str,
        fixture: &'static str,
        request: HashMap<String, String>,
        want: RbacResult,
    }

    let cases = vec![
        Case {
            name: "deny all",
            fixture: "deny-all",
            request: RequestBuilder::new().build(),
            want: denied_by("deny-all"),
        },
        Case {
            name: "meta deny default namespace",
            fixture: "principal-metadata",
            request: RequestBuilder::new()
                .principal("spiffe://cluster.local/ns/default/httpbin")
                .build(),
            want: denied_by("metadata-match"),
        },
        Case {
            name: "meta allow foo namespace",
            fixture: "principal-metadata",
            request: RequestBuilder::new()
                .principal("spiffe://cluster.local/ns/foo/httpbin")
                .build(),
            want: allowed_by_default(),
        },
        Case {
            name: "path deny",
            fixture: "permission-path",
            request: RequestBuilder::new().path("/deny").build(),
            want: denied_by("path-match"),
        },
        Case {
            name: "path allow",
            fixture: "permission-path",
            request: RequestBuilder::new().path("/hello").build(),
            want: allowed_by_default(),
        },
        Case {
            name: "header value regex match deny",
            fixture: "principal-headers-value",
            request: RequestBuilder::new().path("/deny/me/ok").build(),
            want: denied_by("header-regex-match"),
        },
        Case {
            name: "header value prefix match deny",
            fixture: "principal-headers-value",
            request: RequestBuilder::new().path("/control-api/hello").build(),
            want: denied_by("header-regex-match"),
        },
        Case {
            name: "header value suffix match deny",
            fixture: "principal-headers-value",
            request: RequestBuilder::new().path("/api/a.html").build(),
            want: denied_by("header-regex-match"),
        },
        Case {
            name: "header value range match deny",
            fixture: "principal-headers-value",
            request: RequestBuilder::new().header("x-timeout", "101").build(),
            want: denied_by("header-regex-match"),
        },
        Case {
            name: "header value no match allow",
            fixture: "principal-headers-value",
            request: RequestBuilder::new()
                .path("/api/a.json")
                .header("x-timeout", "99")
                .build(),
            want: allowed_by_default(),
        },
        Case {
            name: "header value non-numeric timeout allow",
            fixture: "principal-headers-value",
            request: RequestBuilder::new().header("x-timeout", "soon").build(),
            want: allowed_by_default(),
        },
    ];

    for case in cases {
        let doc = load_fixture(case.fixture);
        let got = filter(&doc, &case.request);
        assert_eq!(got, case.want, "{}: Filter({:?})", case.name, case.request);
    }
}

#[test]
fn test_allow_list_mesh_policies() {
    let doc = load_fixture("allow-mesh");
    assert_eq!(doc.action(), Action::Allow);

    let frontend = || {
        RequestBuilder::new()
            .principal("spiffe://cluster.local/ns/shop/sa/frontend")
            .source_ip("10.9.1.20")
            .destination_port(50051)
    };

    let health = filter(&doc, &RequestBuilder::new().path("/grpc.health.v1.Health/Check").build());
    assert!(health.allowed);
    assert_eq!(health.matched_policy_name, "health-checks");

    let get = filter(&doc, &frontend().path("/orders.OrderService/Get").build());
    assert!(get.allowed);
    assert_eq!(get.matched_policy_name, "frontend-to-orders");

    let canary = filter(
        &doc,
        &frontend()
            .principal("spiffe://cluster.local/ns/shop/sa/frontend-canary")
            .path("/orders.OrderService/List")
            .build(),
    );
    assert_eq!(canary.matched_policy_name, "frontend-to-orders");

    // excluded method, wrong port, outside the source range, lookalike principal
    for request in [
        frontend().path("/orders.OrderService/Delete").build(),
        frontend().path("/orders.OrderService/Get").destination_port(8080).build(),
        frontend().path("/orders.OrderService/Get").source_ip("10.12.0.1").build(),
        frontend()
            .principal("spiffe://cluster.local/ns/shop/sa/frontend-evil")
            .path("/orders.OrderService/Get")
            .build(),
        frontend()
            .principal("spiffe://clusterXlocal/ns/shop/sa/frontend")
            .path("/orders.OrderService/Get")
            .build(),
    ] {
        let result = filter(&doc, &request);
        assert_eq!(result, RbacResult::default_for(Action::Allow), "{request:?}");
    }

    let admin = filter(
        &doc,
        &RequestBuilder::new().path("/orders.OrderService/Delete").header("x-role", "admin").build(),
    );
    assert!(admin.allowed);
    assert_eq!(admin.matched_policy_name, "admins");

    let ops = filter(
        &doc,
        &RequestBuilder::new().principal("spiffe://cluster.local/ns/infra/sa/ops").build(),
    );
    assert_eq!(ops.matched_policy_name, "admins");
}

#[test]
fn test_filter_store_with_fixture_updates() {
    let store = RbacFilter::default();
    store.update(&raw_fixture("permission-path")).unwrap();

    let deny = RequestBuilder::new().path("/deny").build();
    assert_eq!(store.check(&deny).unwrap(), denied_by("path-match"));

    store.update(&raw_fixture("deny-all")).unwrap();
    let hello = RequestBuilder::new().path("/hello").build();
    assert_eq!(store.check(&hello).unwrap(), denied_by("deny-all"));
}

#[test]
fn test_load_document_from_fixture_path() {
    let doc = load_document(&fixture_path("principal-headers-value"), &CompileOptions::default())
        .unwrap();
    assert_eq!(doc.policies().len(), 1);
    assert!(doc.policy("header-regex-match").is_some());
}
