use chrono_tz::Tz;
use dashmap::DashMap;
use ulid::Ulid;

use crate::engine::EngineError;
use crate::limits::{MAX_TENANTS, MAX_TENANT_SLUG_LEN};
use crate::model::Tenant;
use crate::observability;

/// Registry of tenants, addressed by id or by URL slug. Slugs are
/// unique across the process; ids are the keys everything else uses.
pub struct TenantDirectory {
    tenants: DashMap<Ulid, Tenant>,
    by_slug: DashMap<String, Ulid>,
}

/// Lowercase and keep only `[a-z0-9_-]`; everything else becomes `-`.
fn sanitize_slug(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| match c.to_ascii_lowercase() {
            c @ ('a'..='z' | '0'..='9' | '_' | '-') => c,
            _ => '-',
        })
        .collect()
}

impl Default for TenantDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl TenantDirectory {
    pub fn new() -> Self {
        Self {
            tenants: DashMap::new(),
            by_slug: DashMap::new(),
        }
    }

    /// Register a tenant. The slug is sanitized before the uniqueness
    /// check, so "Café Río" and "cafe-r-o" can collide. An absent
    /// timezone defaults to Buenos Aires.
    pub fn create(
        &self,
        slug: &str,
        name: &str,
        timezone: Option<&str>,
    ) -> Result<Tenant, EngineError> {
        let slug = sanitize_slug(slug);
        if slug.is_empty() || slug.len() > MAX_TENANT_SLUG_LEN {
            return Err(EngineError::InvalidInput(format!(
                "tenant slug must be 1..={MAX_TENANT_SLUG_LEN} characters"
            )));
        }
        if self.tenants.len() >= MAX_TENANTS {
            return Err(EngineError::Unavailable("tenant limit reached".into()));
        }
        let timezone = match timezone {
            Some(tz) => Some(tz.parse::<Tz>().map_err(|_| {
                EngineError::InvalidInput(format!("unknown timezone '{tz}'"))
            })?),
            None => Some(chrono_tz::America::Argentina::Buenos_Aires),
        };

        let tenant = Tenant {
            id: Ulid::new(),
            slug: slug.clone(),
            name: name.to_string(),
            timezone,
        };
        // Slug claim doubles as the uniqueness check.
        if self.by_slug.insert(slug.clone(), tenant.id).is_some() {
            // Restore the previous owner before reporting the clash.
            if let Some(existing) = self
                .tenants
                .iter()
                .find(|t| t.slug == slug)
                .map(|t| t.id)
            {
                self.by_slug.insert(slug.clone(), existing);
            }
            return Err(EngineError::AlreadyExists(format!(
                "tenant slug '{slug}' is taken"
            )));
        }
        self.tenants.insert(tenant.id, tenant.clone());
        metrics::gauge!(observability::TENANTS_ACTIVE).set(self.tenants.len() as f64);
        tracing::info!(tenant = %tenant.id, slug = %tenant.slug, "tenant created");
        Ok(tenant)
    }

    pub fn get(&self, id: Ulid) -> Option<Tenant> {
        self.tenants.get(&id).map(|t| t.value().clone())
    }

    pub fn get_by_slug(&self, slug: &str) -> Option<Tenant> {
        let id = *self.by_slug.get(slug)?;
        self.get(id)
    }

    pub fn len(&self) -> usize {
        self.tenants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tenants.is_empty()
    }
}
