//! Unit tests for inference-operator.
//!
//! These tests run without a Kubernetes cluster and test individual
//! components in isolation.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

mod crd_tests {
    use inference_operator::crd::{
        Condition, ConditionStatus, ConditionType, InferenceService, InferenceServiceStatus,
        ServiceState,
    };
    use kube::CustomResourceExt;

    #[test]
    fn test_state_display() {
        assert_eq!(ServiceState::Creating.to_string(), "Creating");
        assert_eq!(ServiceState::Available.to_string(), "Available");
        assert_eq!(ServiceState::Failed.to_string(), "Failed");
    }

    #[test]
    fn test_defaults() {
        assert_eq!(ServiceState::default(), ServiceState::Creating);
        assert_eq!(ConditionStatus::default(), ConditionStatus::Unknown);
    }

    #[test]
    fn test_condition_type_names() {
        assert_eq!(ConditionType::Ready.as_str(), "Ready");
        assert_eq!(ConditionType::BackendReady.to_string(), "BackendReady");
    }

    #[test]
    fn test_condition_new() {
        let condition = Condition::new(
            "BackendReady",
            ConditionStatus::False,
            "CrashLoop",
            "container exited",
            "2026-01-01T00:00:00Z",
        );
        assert_eq!(condition.r#type, "BackendReady");
        assert!(!condition.is_true());
        assert_eq!(condition.last_transition_time, "2026-01-01T00:00:00Z");
    }

    #[test]
    fn test_status_wire_format() {
        let status = InferenceServiceStatus {
            state: ServiceState::Available,
            url: Some("https://svc.example".to_string()),
            backend: Some("kserve".to_string()),
            observed_generation: Some(3),
            conditions: vec![],
            components: None,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "Available");
        assert_eq!(json["observedGeneration"], 3);
        assert!(json.get("components").is_none());
    }

    #[test]
    fn test_status_reads_empty_object() {
        let status: InferenceServiceStatus = serde_json::from_str("{}").unwrap();
        assert_eq!(status.state, ServiceState::Creating);
        assert!(status.conditions.is_empty());
    }

    #[test]
    fn test_crd_identity() {
        let crd = InferenceService::crd();
        assert_eq!(crd.spec.names.kind, "InferenceService");
        assert_eq!(crd.spec.scope, "Namespaced");
    }
}

mod error_tests {
    use std::time::Duration;

    use inference_operator::controller::error::{Error, Stage};

    fn api_error(code: u16) -> Error {
        Error::Kube(kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: "test".to_string(),
            reason: "Test".to_string(),
            code,
        }))
    }

    #[test]
    fn test_retryable_codes() {
        assert!(api_error(500).is_retryable());
        assert!(api_error(429).is_retryable());
        assert!(api_error(409).is_retryable());
        assert!(!api_error(400).is_retryable());
        assert!(!api_error(403).is_retryable());
    }

    #[test]
    fn test_rejected_codes() {
        assert!(api_error(422).is_rejected());
        assert!(api_error(400).is_rejected());
        assert!(!api_error(409).is_rejected());
    }

    #[test]
    fn test_transient_store_requeues_quickly() {
        let err = Error::TransientStore("gone".to_string()).in_stage(Stage::Converge);
        assert_eq!(err.requeue_after(), Duration::from_secs(30));
    }

    #[test]
    fn test_missing_field_requeues_slowly() {
        let err = Error::MissingField("metadata.namespace".to_string());
        assert_eq!(err.requeue_after(), Duration::from_secs(300));
        assert_eq!(err.stage(), None);
    }
}

mod backend_tests {
    use inference_operator::backends::{BackendAdapter, BackendKind, KServeAdapter, SeldonAdapter};
    use inference_operator::controller::error::Error;

    #[test]
    fn test_parse_names_and_aliases() {
        assert_eq!("kserve".parse::<BackendKind>().unwrap(), BackendKind::KServe);
        assert_eq!("KFServing".parse::<BackendKind>().unwrap(), BackendKind::KServe);
        assert_eq!(" Seldon ".parse::<BackendKind>().unwrap(), BackendKind::Seldon);
    }

    #[test]
    fn test_parse_unknown() {
        let err = "triton".parse::<BackendKind>().unwrap_err();
        assert!(matches!(err, Error::UnsupportedBackend(b) if b == "triton"));
    }

    #[test]
    fn test_api_resources() {
        let kserve = BackendKind::KServe.api_resource();
        assert_eq!(kserve.group, "serving.kserve.io");
        assert_eq!(kserve.version, "v1beta1");
        assert_eq!(kserve.plural, "inferenceservices");

        let seldon = BackendKind::Seldon.api_resource();
        assert_eq!(seldon.group, "machinelearning.seldon.io");
        assert_eq!(seldon.kind, "SeldonDeployment");
        assert_eq!(seldon.plural, "seldondeployments");
    }

    #[test]
    fn test_adapter_owned_fields() {
        assert_eq!(KServeAdapter.owned_spec_field(), "predictor");
        assert_eq!(SeldonAdapter.owned_spec_field(), "predictors");
        assert_eq!(KServeAdapter.kind(), BackendKind::KServe);
        assert_eq!(SeldonAdapter.kind(), BackendKind::Seldon);
    }
}

mod status_tests {
    use inference_operator::backends::BackendStatus;
    use inference_operator::backends::kserve::{ChildCondition, KServeStatus};
    use inference_operator::backends::seldon::SeldonStatus;
    use inference_operator::controller::status::{
        get_condition_reason, is_condition_true, propagate, unsupported_backend,
    };
    use inference_operator::crd::{ConditionType, InferenceServiceStatus, ServiceState};

    const NOW: &str = "2026-01-01T00:00:00Z";

    fn kserve_ready(url: Option<&str>) -> BackendStatus {
        BackendStatus::KServe(KServeStatus {
            url: url.map(str::to_string),
            conditions: vec![ChildCondition {
                r#type: "Ready".to_string(),
                status: "True".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        })
    }

    #[test]
    fn test_ready_without_url_is_not_available() {
        let status = propagate(
            &InferenceServiceStatus::default(),
            "kserve",
            &kserve_ready(None),
            NOW,
        );
        assert_eq!(status.state, ServiceState::Creating);
        assert!(is_condition_true(&status.conditions, ConditionType::BackendReady));
    }

    #[test]
    fn test_ready_with_url_is_available() {
        let status = propagate(
            &InferenceServiceStatus::default(),
            "kserve",
            &kserve_ready(Some("https://svc.example")),
            NOW,
        );
        assert_eq!(status.state, ServiceState::Available);
        assert!(is_condition_true(&status.conditions, ConditionType::Ready));
    }

    #[test]
    fn test_seldon_intermediate_state_is_reason() {
        let child = BackendStatus::Seldon(SeldonStatus {
            state: Some("Creating".to_string()),
            ..Default::default()
        });
        let status = propagate(&InferenceServiceStatus::default(), "seldon", &child, NOW);
        assert_eq!(status.state, ServiceState::Creating);
        assert_eq!(
            get_condition_reason(&status.conditions, ConditionType::BackendReady),
            Some("Creating")
        );
    }

    #[test]
    fn test_unsupported_backend_status() {
        let status = unsupported_backend(&InferenceServiceStatus::default(), "triton", NOW);
        assert_eq!(status.state, ServiceState::Failed);
        assert!(status.url.is_none());
        assert_eq!(
            get_condition_reason(&status.conditions, ConditionType::Ready),
            Some("UnsupportedBackend")
        );
    }

    #[test]
    fn test_transition_time_kept_while_status_holds() {
        let first = propagate(
            &InferenceServiceStatus::default(),
            "kserve",
            &kserve_ready(Some("https://svc.example")),
            NOW,
        );
        let second = propagate(
            &first,
            "kserve",
            &kserve_ready(Some("https://svc.example")),
            "2026-01-02T00:00:00Z",
        );
        assert_eq!(first, second);
    }
}

mod config_tests {
    use inference_operator::OperatorConfig;
    use inference_operator::backends::BackendKind;

    #[test]
    fn test_enabled_backends_from_lookup() {
        let cfg = OperatorConfig::from_lookup(|key| match key {
            "ENABLED_BACKENDS" => Some("kserve".to_string()),
            _ => None,
        });
        assert_eq!(cfg.enabled_backends, vec![BackendKind::KServe]);
        assert_eq!(cfg.watch_namespace, None);
    }
}
