//! Static permission table.

use async_trait::async_trait;
use gatehouse_core::Result;
use gatehouse_core::ids::PipelineName;
use gatehouse_core::ports::SecurityService;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

#[derive(Debug, Default)]
struct Grants {
    admins: HashSet<String>,
    pipeline_operators: HashMap<PipelineName, HashSet<String>>,
    stage_operators: HashMap<(PipelineName, String), HashSet<String>>,
}

/// Permission table held in memory.
///
/// Admins may operate everything. A stage-level grant overrides the
/// pipeline-level one for that stage only. With security disabled every
/// user may operate every pipeline.
#[derive(Debug)]
pub struct StaticSecurityService {
    enabled: bool,
    grants: RwLock<Grants>,
}

impl StaticSecurityService {
    pub fn new() -> Self {
        Self {
            enabled: true,
            grants: RwLock::new(Grants::default()),
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            grants: RwLock::new(Grants::default()),
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Grants> {
        self.grants.write().unwrap_or_else(|p| p.into_inner())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Grants> {
        self.grants.read().unwrap_or_else(|p| p.into_inner())
    }

    pub fn grant_admin(&self, user: impl Into<String>) {
        self.write().admins.insert(user.into());
    }

    pub fn grant_pipeline(&self, user: impl Into<String>, pipeline: &PipelineName) {
        self.write()
            .pipeline_operators
            .entry(pipeline.clone())
            .or_default()
            .insert(user.into());
    }

    pub fn grant_stage(
        &self,
        user: impl Into<String>,
        pipeline: &PipelineName,
        stage: impl Into<String>,
    ) {
        self.write()
            .stage_operators
            .entry((pipeline.clone(), stage.into().to_lowercase()))
            .or_default()
            .insert(user.into());
    }
}

impl Default for StaticSecurityService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecurityService for StaticSecurityService {
    async fn has_operate_permission_for_pipeline(
        &self,
        user: &str,
        pipeline: &PipelineName,
    ) -> Result<bool> {
        if !self.enabled {
            return Ok(true);
        }
        let grants = self.read();
        Ok(grants.admins.contains(user)
            || grants
                .pipeline_operators
                .get(pipeline)
                .is_some_and(|users| users.contains(user)))
    }

    async fn has_operate_permission_for_stage(
        &self,
        user: &str,
        pipeline: &PipelineName,
        stage: &str,
    ) -> Result<bool> {
        if !self.enabled {
            return Ok(true);
        }
        let grants = self.read();
        if grants.admins.contains(user) {
            return Ok(true);
        }
        match grants
            .stage_operators
            .get(&(pipeline.clone(), stage.to_lowercase()))
        {
            Some(users) => Ok(users.contains(user)),
            None => Ok(grants
                .pipeline_operators
                .get(pipeline)
                .is_some_and(|users| users.contains(user))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pipeline_grant_covers_its_stages() {
        let security = StaticSecurityService::new();
        let up = PipelineName::new("up");
        security.grant_pipeline("alice", &up);

        assert!(security.has_operate_permission_for_pipeline("alice", &up).await.unwrap());
        assert!(security.has_operate_permission_for_stage("alice", &up, "build").await.unwrap());
        assert!(!security.has_operate_permission_for_pipeline("bob", &up).await.unwrap());
    }

    #[tokio::test]
    async fn test_stage_grant_overrides_pipeline_grant() {
        let security = StaticSecurityService::new();
        let up = PipelineName::new("up");
        security.grant_pipeline("alice", &up);
        security.grant_stage("bob", &up, "Deploy");

        assert!(security.has_operate_permission_for_stage("bob", &up, "deploy").await.unwrap());
        assert!(!security.has_operate_permission_for_stage("alice", &up, "deploy").await.unwrap());
    }

    #[tokio::test]
    async fn test_admin_and_disabled() {
        let security = StaticSecurityService::new();
        security.grant_admin("root");
        let up = PipelineName::new("up");
        assert!(security.has_operate_permission_for_stage("root", &up, "x").await.unwrap());

        let open = StaticSecurityService::disabled();
        assert!(open.has_operate_permission_for_pipeline("anyone", &up).await.unwrap());
    }
}
