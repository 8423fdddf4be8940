//! Leader election over a `coordination.k8s.io` Lease.
//!
//! Only the holder of the lease runs the controller. The holder renews well
//! within the lease duration; once the renew time is older than the duration
//! any candidate may take the lease over. Writes carry the observed
//! `resourceVersion`, so two candidates racing for an expired lease cannot
//! both win.

use std::time::Duration;

use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{MicroTime, ObjectMeta};
use k8s_openapi::chrono::{DateTime, Utc};
use kube::api::{Api, PostParams};
use kube::{Client, ResourceExt};
use tracing::{debug, info};

use crate::controller::error::Result;

/// What a candidate may do with the lease it observed.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Claim {
    /// No lease yet.
    Create,
    /// Held by us, refresh the renew time.
    Renew,
    /// Expired or released, take it over.
    TakeOver,
    /// Someone else holds a live lease.
    HeldBy(String),
}

/// Lease lock for one candidate identity.
pub struct LeaderLease {
    api: Api<Lease>,
    name: String,
    holder: String,
    duration_secs: i32,
}

impl LeaderLease {
    pub fn new(
        client: Client,
        namespace: &str,
        name: impl Into<String>,
        holder: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            name: name.into(),
            holder: holder.into(),
            duration_secs: i32::try_from(duration.as_secs()).unwrap_or(i32::MAX),
        }
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    /// Acquire the lease or renew it. Returns whether we hold it afterwards.
    ///
    /// Losing a write race is not an error, it just means someone else holds it.
    pub async fn try_acquire_or_renew(&self) -> Result<bool> {
        let now = Utc::now();
        let current = self.api.get_opt(&self.name).await?;
        let claim = claim(current.as_ref(), &self.holder, now);

        let lease = match &claim {
            Claim::HeldBy(holder) => {
                debug!(
                    lease = %self.name,
                    holder = %holder,
                    "Lease held by another candidate"
                );
                return Ok(false);
            }
            Claim::Create | Claim::Renew | Claim::TakeOver => next_lease(
                current.as_ref(),
                &self.name,
                &self.holder,
                self.duration_secs,
                now,
            ),
        };

        let written = match claim {
            Claim::Create => self.api.create(&PostParams::default(), &lease).await,
            _ => {
                self.api
                    .replace(&self.name, &PostParams::default(), &lease)
                    .await
            }
        };
        match written {
            Ok(_) => {
                if claim != Claim::Renew {
                    info!(lease = %self.name, holder = %self.holder, "Lease acquired");
                }
                Ok(true)
            }
            Err(kube::Error::Api(ref resp)) if resp.code == 409 => {
                debug!(lease = %self.name, "Lost lease write race");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Give the lease up so a standby replica does not wait for it to expire.
    pub async fn release(&self) -> Result<()> {
        let Some(mut lease) = self.api.get_opt(&self.name).await? else {
            return Ok(());
        };
        if holder_of(&lease) != Some(self.holder.as_str()) {
            return Ok(());
        }
        if let Some(spec) = lease.spec.as_mut() {
            spec.holder_identity = None;
        }
        self.api
            .replace(&lease.name_any(), &PostParams::default(), &lease)
            .await?;
        info!(lease = %self.name, holder = %self.holder, "Lease released");
        Ok(())
    }
}

fn holder_of(lease: &Lease) -> Option<&str> {
    lease.spec.as_ref()?.holder_identity.as_deref()
}

/// A lease without a renew time or duration counts as expired.
fn is_expired(lease: &Lease, now: DateTime<Utc>) -> bool {
    match lease.spec.as_ref() {
        Some(LeaseSpec {
            renew_time: Some(renewed),
            lease_duration_seconds: Some(duration),
            ..
        }) => (now - renewed.0).num_seconds() > i64::from(*duration),
        _ => true,
    }
}

fn claim(lease: Option<&Lease>, holder: &str, now: DateTime<Utc>) -> Claim {
    let Some(lease) = lease else {
        return Claim::Create;
    };
    match holder_of(lease) {
        Some(current) if current == holder => Claim::Renew,
        Some(current) if !is_expired(lease, now) => Claim::HeldBy(current.to_string()),
        _ => Claim::TakeOver,
    }
}

/// The lease as `holder` writes it at `now`, keeping the observed
/// `resourceVersion` and counting a transition when the holder changes.
fn next_lease(
    current: Option<&Lease>,
    name: &str,
    holder: &str,
    duration_secs: i32,
    now: DateTime<Utc>,
) -> Lease {
    let previous = current.and_then(|lease| lease.spec.clone()).unwrap_or_default();
    let renewing = previous.holder_identity.as_deref() == Some(holder);
    let transitions = previous.lease_transitions.unwrap_or(0);

    Lease {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..current.map(|lease| lease.metadata.clone()).unwrap_or_default()
        },
        spec: Some(LeaseSpec {
            holder_identity: Some(holder.to_string()),
            lease_duration_seconds: Some(duration_secs),
            acquire_time: if renewing {
                previous.acquire_time
            } else {
                Some(MicroTime(now))
            },
            renew_time: Some(MicroTime(now)),
            lease_transitions: Some(match current {
                Some(_) if !renewing => transitions + 1,
                _ => transitions,
            }),
            ..previous
        }),
    }
}
