use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::PipelineConfig;
use crate::entities::molecule::MoleculeRecord;
use crate::error::PharmyrusError;
use crate::pipeline::backends::{ChemicalRegistry, RegistryRecord};
use crate::pipeline::budget::call_with_budget;
use crate::transform;

const MAX_NAME_LEN: usize = 256;

/// Validates a user-supplied molecule name.
pub(crate) fn validate_name(name: &str) -> Result<&str, PharmyrusError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(PharmyrusError::InvalidArgument(
            "Molecule name is required".into(),
        ));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(PharmyrusError::InvalidArgument(format!(
            "Molecule name is too long (max {MAX_NAME_LEN} characters)"
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(PharmyrusError::InvalidArgument(
            "Molecule name must not contain control characters".into(),
        ));
    }
    Ok(name)
}

async fn lookup(
    registry: &dyn ChemicalRegistry,
    query: &str,
    config: &PipelineConfig,
    deadline: Instant,
) -> Result<Option<RegistryRecord>, PharmyrusError> {
    call_with_budget(registry.name(), config.call_budget, deadline, || {
        registry.lookup(query)
    })
    .await
    .map_err(|err| {
        if err.is_upstream() {
            warn!(source = registry.name(), query, "molecule resolution failed: {err}");
            PharmyrusError::UpstreamUnavailable {
                api: registry.name().to_string(),
                reason: err.to_string(),
            }
        } else {
            err
        }
    })
}

/// Resolves a drug name (and optional brand) to its canonical record.
///
/// When the registry does not know the name, the brand is looked up instead.
/// Identity is on the required path: a miss on both is `NotFound` and an
/// unreachable registry is `UpstreamUnavailable`, both terminal.
pub(crate) async fn resolve(
    registry: &dyn ChemicalRegistry,
    name: &str,
    brand: Option<&str>,
    config: &PipelineConfig,
    deadline: Instant,
) -> Result<MoleculeRecord, PharmyrusError> {
    let name = validate_name(name)?;
    debug!(source = registry.name(), molecule = name, "resolving molecule");

    let mut record = lookup(registry, name, config, deadline).await?;
    if record.is_none()
        && let Some(brand) = brand
            .map(str::trim)
            .filter(|b| !b.is_empty() && !b.eq_ignore_ascii_case(name))
    {
        debug!(source = registry.name(), molecule = name, brand, "name unknown, trying brand");
        record = lookup(registry, brand, config, deadline).await?;
    }

    let Some(record) = record else {
        return Err(PharmyrusError::NotFound {
            entity: "molecule".into(),
            id: name.to_string(),
            suggestion:
                "Check the spelling or try the INN name. Example: pharmyrus search darolutamide"
                    .into(),
        });
    };

    Ok(transform::molecule::from_registry(name, brand, record))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::config::CallBudget;

    enum Behavior {
        Found,
        Missing,
        Down,
        BrandOnly,
    }

    struct FakeRegistry(Behavior);

    #[async_trait]
    impl ChemicalRegistry for FakeRegistry {
        fn name(&self) -> &'static str {
            "registry"
        }

        async fn lookup(&self, name: &str) -> Result<Option<RegistryRecord>, PharmyrusError> {
            match self.0 {
                Behavior::Found => Ok(Some(RegistryRecord {
                    canonical_name: Some(name.to_ascii_lowercase()),
                    registry_id: Some("CID:67171867".into()),
                    synonyms: vec!["ODM-201".into()],
                    ..RegistryRecord::default()
                })),
                Behavior::Missing => Ok(None),
                Behavior::BrandOnly if name.eq_ignore_ascii_case("nubeqa") => {
                    Ok(Some(RegistryRecord {
                        canonical_name: Some("darolutamide".into()),
                        synonyms: vec!["Nubeqa".into(), "ODM-201".into()],
                        ..RegistryRecord::default()
                    }))
                }
                Behavior::BrandOnly => Ok(None),
                Behavior::Down => Err(PharmyrusError::Api {
                    api: "registry".into(),
                    message: "HTTP 503".into(),
                }),
            }
        }
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            call_budget: CallBudget::new(Duration::from_millis(100), 2),
            ..PipelineConfig::default()
        }
    }

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    #[tokio::test]
    async fn resolves_and_keeps_brand() {
        let registry = FakeRegistry(Behavior::Found);
        let record = resolve(&registry, " Darolutamide ", Some("Nubeqa"), &config(), deadline())
            .await
            .expect("resolved");
        assert_eq!(record.name, "darolutamide");
        assert_eq!(record.dev_codes, vec!["ODM-201"]);
        assert_eq!(record.primary_brand(), Some("Nubeqa"));
    }

    #[tokio::test]
    async fn registry_miss_is_not_found() {
        let registry = FakeRegistry(Behavior::Missing);
        let err = resolve(&registry, "unobtainium", None, &config(), deadline())
            .await
            .unwrap_err();
        assert!(matches!(err, PharmyrusError::NotFound { .. }));
        assert!(err.to_string().contains("unobtainium"));
    }

    #[tokio::test]
    async fn unknown_name_falls_back_to_brand() {
        let record = resolve(
            &FakeRegistry(Behavior::BrandOnly),
            "darolutamid",
            Some("Nubeqa"),
            &config(),
            deadline(),
        )
        .await
        .expect("resolved through brand");
        assert_eq!(record.name, "darolutamide");
        assert_eq!(record.primary_brand(), Some("Nubeqa"));
        assert_eq!(record.dev_codes, vec!["ODM-201"]);

        let registry = FakeRegistry(Behavior::BrandOnly);
        let err = resolve(&registry, "darolutamid", None, &config(), deadline())
            .await
            .unwrap_err();
        assert!(matches!(err, PharmyrusError::NotFound { .. }));
        assert!(err.to_string().contains("darolutamid"));
    }

    #[tokio::test]
    async fn registry_outage_is_upstream_unavailable() {
        let registry = FakeRegistry(Behavior::Down);
        let err = resolve(&registry, "darolutamide", None, &config(), deadline())
            .await
            .unwrap_err();
        assert!(matches!(err, PharmyrusError::UpstreamUnavailable { .. }));
    }

    #[test]
    fn rejects_empty_and_oversized_names() {
        assert!(validate_name("   ").is_err());
        assert!(validate_name(&"x".repeat(300)).is_err());
        assert!(validate_name("bad\u{0}name").is_err());
        assert_eq!(validate_name(" olaparib ").unwrap(), "olaparib");
    }
}
