//! Tenant service - the tenant registry
//!
//! The only place a `TenantScope` is minted. Everything tenant-scoped
//! starts by resolving a code or key here.

use std::sync::Arc;

use crate::adapters::duckdb::DuckDbRepository;
use crate::domain::result::{Error, Result};
use crate::domain::{normalize_code, Tenant, TenantKey, TenantScope};

pub struct TenantService {
    repository: Arc<DuckDbRepository>,
}

impl TenantService {
    pub fn new(repository: Arc<DuckDbRepository>) -> Self {
        Self { repository }
    }

    /// Register a tenant. Registering an existing code returns it unchanged.
    pub fn register(&self, code: &str, name: &str) -> Result<Tenant> {
        let code = normalize_code(code)?;
        if let Some(existing) = self.repository.get_tenant_by_code(&code)? {
            return Ok(existing);
        }

        let tenant = Tenant::new(&code, name)?;
        match self.repository.insert_tenant(&tenant) {
            Ok(()) => {
                tracing::info!(tenant = %tenant.code, "registered tenant");
                Ok(tenant)
            }
            // Lost a race with a concurrent registration of the same code
            Err(e) => self.repository.get_tenant_by_code(&code)?.ok_or(e),
        }
    }

    pub fn list(&self) -> Result<Vec<Tenant>> {
        self.repository.list_tenants()
    }

    pub fn get(&self, code: &str) -> Result<Tenant> {
        let code = normalize_code(code).map_err(|_| Error::UnknownTenant(code.to_string()))?;
        self.repository
            .get_tenant_by_code(&code)?
            .ok_or(Error::UnknownTenant(code))
    }

    /// Resolve a tenant code for reading. Inactive tenants stay readable.
    pub fn resolve(&self, code: &str) -> Result<(Tenant, TenantScope)> {
        let tenant = self.get(code)?;
        let scope = TenantScope::new(tenant.key);
        Ok((tenant, scope))
    }

    /// Resolve a tenant code for writing; inactive tenants are refused
    pub fn resolve_for_write(&self, code: &str) -> Result<(Tenant, TenantScope)> {
        let (tenant, scope) = self.resolve(code)?;
        if !tenant.active {
            return Err(Error::InactiveTenant(tenant.code));
        }
        Ok((tenant, scope))
    }

    /// Resolve an internal key
    pub fn resolve_key(&self, key: TenantKey) -> Result<(Tenant, TenantScope)> {
        let tenant = self
            .repository
            .get_tenant_by_key(key)?
            .ok_or_else(|| Error::UnknownTenant(key.to_string()))?;
        let scope = TenantScope::new(tenant.key);
        Ok((tenant, scope))
    }

    pub fn deactivate(&self, code: &str) -> Result<Tenant> {
        self.set_active(code, false)
    }

    pub fn activate(&self, code: &str) -> Result<Tenant> {
        self.set_active(code, true)
    }

    fn set_active(&self, code: &str, active: bool) -> Result<Tenant> {
        let tenant = self.get(code)?;
        if tenant.active != active {
            self.repository.set_tenant_active(tenant.key, active)?;
            tracing::info!(tenant = %tenant.code, active, "tenant state changed");
        }
        self.get(&tenant.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TenantService {
        let repo = DuckDbRepository::in_memory().unwrap();
        repo.ensure_schema().unwrap();
        TenantService::new(Arc::new(repo))
    }

    #[test]
    fn test_register_is_idempotent_on_code() {
        let service = service();
        let first = service.register("reitz", "Reitz Pharmacy").unwrap();
        let second = service.register(" REITZ ", "Another name").unwrap();

        assert_eq!(first.key, second.key);
        assert_eq!(second.name, "Reitz Pharmacy");
        assert_eq!(service.list().unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_code() {
        let service = service();
        assert!(matches!(service.resolve("NOPE"), Err(Error::UnknownTenant(_))));
        assert!(matches!(service.resolve(""), Err(Error::UnknownTenant(_))));
        assert!(matches!(
            service.resolve_key(TenantKey::generate()),
            Err(Error::UnknownTenant(_))
        ));
    }

    #[test]
    fn test_inactive_tenant_readable_not_writable() {
        let service = service();
        service.register("REITZ", "Reitz").unwrap();
        let tenant = service.deactivate("reitz").unwrap();
        assert!(!tenant.active);

        assert!(service.resolve("REITZ").is_ok());
        assert!(matches!(
            service.resolve_for_write("REITZ"),
            Err(Error::InactiveTenant(_))
        ));

        service.activate("REITZ").unwrap();
        assert!(service.resolve_for_write("REITZ").is_ok());
    }
}
