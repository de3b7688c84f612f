//! Advisory classification of provisioning failures into condition
//! reasons. Substring matching on the adapter's error message; fragile,
//! kept only as a fallback until adapters report structured error kinds.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningFailureKind {
    ImageNotFound,
    CredentialsNotFound,
    ModeNotSupported,
    BinaryNotFound,
    ContainerFailed,
    NetworkError,
    ProvisioningFailed,
}

impl ProvisioningFailureKind {
    pub fn reason(self) -> &'static str {
        match self {
            ProvisioningFailureKind::ImageNotFound => "ImageNotFound",
            ProvisioningFailureKind::CredentialsNotFound => "CredentialsNotFound",
            ProvisioningFailureKind::ModeNotSupported => "ModeNotSupported",
            ProvisioningFailureKind::BinaryNotFound => "BinaryNotFound",
            ProvisioningFailureKind::ContainerFailed => "ContainerFailed",
            ProvisioningFailureKind::NetworkError => "NetworkError",
            ProvisioningFailureKind::ProvisioningFailed => "ProvisioningFailed",
        }
    }
}

pub fn classify_provisioning_error(message: &str) -> ProvisioningFailureKind {
    let lower = message.to_lowercase();
    if lower.contains("image not found") || lower.contains("no such image") {
        ProvisioningFailureKind::ImageNotFound
    } else if lower.contains("credential") || lower.contains("unauthorized") || lower.contains("permission denied") {
        ProvisioningFailureKind::CredentialsNotFound
    } else if lower.contains("mode not supported") || lower.contains("unsupported mode") {
        ProvisioningFailureKind::ModeNotSupported
    } else if lower.contains("binary not found") || lower.contains("no such file") {
        ProvisioningFailureKind::BinaryNotFound
    } else if lower.contains("container") {
        ProvisioningFailureKind::ContainerFailed
    } else if lower.contains("network") || lower.contains("connection refused") || lower.contains("timeout") {
        ProvisioningFailureKind::NetworkError
    } else {
        ProvisioningFailureKind::ProvisioningFailed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_patterns() {
        assert_eq!(
            classify_provisioning_error("image not found: cosmos/test:latest"),
            ProvisioningFailureKind::ImageNotFound
        );
        assert_eq!(
            classify_provisioning_error("docker: permission denied while connecting"),
            ProvisioningFailureKind::CredentialsNotFound
        );
        assert_eq!(
            classify_provisioning_error("mode not supported: kubernetes"),
            ProvisioningFailureKind::ModeNotSupported
        );
        assert_eq!(classify_provisioning_error("some other weirdness"), ProvisioningFailureKind::ProvisioningFailed);
    }
}
