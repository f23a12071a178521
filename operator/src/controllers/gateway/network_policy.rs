use k8s_openapi::api::networking::v1::NetworkPolicySpec;
use portico_api::constants::{
    APP_LABEL, DATA_PLANE_ADMIN_API_PORT, DATA_PLANE_METRICS_PORT, DATA_PLANE_PROXY_PORT,
    DATA_PLANE_PROXY_SSL_PORT,
};
use serde_json::json;

/// Admin API reachable only from the ControlPlane pods. Proxy and metrics
/// ports stay open to any source.
pub fn desired_network_policy(
    data_plane: &str,
    control_plane: &str,
) -> Result<NetworkPolicySpec, serde_json::Error> {
    serde_json::from_value(json!({
        "podSelector": { "matchLabels": { APP_LABEL: data_plane } },
        "policyTypes": ["Ingress"],
        "ingress": [
            {
                "from": [{ "podSelector": { "matchLabels": { APP_LABEL: control_plane } } }],
                "ports": [{ "protocol": "TCP", "port": DATA_PLANE_ADMIN_API_PORT }]
            },
            {
                "ports": [
                    { "protocol": "TCP", "port": DATA_PLANE_PROXY_PORT },
                    { "protocol": "TCP", "port": DATA_PLANE_PROXY_SSL_PORT },
                    { "protocol": "TCP", "port": DATA_PLANE_METRICS_PORT }
                ]
            }
        ]
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_port_is_limited_to_control_plane() {
        let spec = desired_network_policy("edge-00001", "edge-00002").expect("policy builds");
        let spec = serde_json::to_value(spec).expect("policy serializes");

        assert_eq!(spec.pointer("/podSelector/matchLabels/app"), Some(&json!("edge-00001")));
        assert_eq!(spec["policyTypes"], json!(["Ingress"]));
        assert_eq!(spec["ingress"].as_array().map(Vec::len), Some(2));

        assert_eq!(
            spec.pointer("/ingress/0/from/0/podSelector/matchLabels/app"),
            Some(&json!("edge-00002"))
        );
        assert_eq!(
            spec.pointer("/ingress/0/ports/0/port"),
            Some(&json!(DATA_PLANE_ADMIN_API_PORT))
        );

        assert!(spec.pointer("/ingress/1/from").is_none());
        let open_ports: Vec<_> = spec["ingress"][1]["ports"]
            .as_array()
            .into_iter()
            .flatten()
            .map(|p| p["port"].clone())
            .collect();
        assert_eq!(
            open_ports,
            vec![
                json!(DATA_PLANE_PROXY_PORT),
                json!(DATA_PLANE_PROXY_SSL_PORT),
                json!(DATA_PLANE_METRICS_PORT),
            ]
        );
    }
}
