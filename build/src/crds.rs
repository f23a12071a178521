use kube::CustomResourceExt;
use portico_api::v1alpha1::{ControlPlane, DataPlane, GatewayConfiguration};
use std::fmt::Write;

/// Renders every CustomResourceDefinition of the operator as one multi-document YAML stream.
pub fn crds_yaml() -> Result<String, serde_yaml::Error> {
    [
        GatewayConfiguration::crd(),
        DataPlane::crd(),
        ControlPlane::crd(),
    ]
    .iter()
    .try_fold(String::new(), |mut output, crd| {
        let document = serde_yaml::to_string(crd)?;
        let _ = writeln!(output, "---\n{document}");
        Ok(output)
    })
}
