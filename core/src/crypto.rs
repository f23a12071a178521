use tracing::debug;

/// Installs the ring provider as the process default for rustls.
///
/// The kube client negotiates TLS through rustls, so this must run before
/// the first client is created. A provider installed earlier is kept.
pub fn init_crypto() {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        debug!("rustls crypto provider was already installed");
    }
}
