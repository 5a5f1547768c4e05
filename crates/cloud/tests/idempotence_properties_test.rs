//! Idempotence over randomly shaped desired states.
//!
//! Each generated task set is converged against an empty cloud, then rebuilt
//! from the same shape and converged again. The second run must change nothing.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::sync::Arc;

use converge_cloud::{LoadBalancer, MemoryCloud, Network, Subnet, Volume};
use converge_core::Field;
use converge_reconciler::{BackoffPolicy, RunReport, RunStatus, RunnerBuilder, TaskSet, TaskState};
use proptest::prelude::*;

#[derive(Debug, Clone)]
struct NetworkShape {
    admin_state_up: Field<bool>,
    subnets: Vec<Field<Vec<String>>>,
}

#[derive(Debug, Clone)]
struct DesiredShape {
    networks: Vec<NetworkShape>,
    load_balancer: Option<Field<String>>,
    volumes: Vec<(u32, Option<String>)>,
}

impl DesiredShape {
    fn tasks(&self) -> TaskSet {
        let mut tasks = TaskSet::new();
        let mut first_subnet: Option<String> = None;

        for (n, network) in self.networks.iter().enumerate() {
            let net = format!("net-{n}");
            tasks.insert(
                net.clone(),
                Network {
                    admin_state_up: network.admin_state_up.clone(),
                    ..Network::named(&net)
                },
            );
            for (s, dns_servers) in network.subnets.iter().enumerate() {
                let name = format!("{net}-subnet-{s}");
                let subnet = Subnet {
                    dns_servers: dns_servers.clone(),
                    ..Subnet::named(&name)
                        .in_network(&net)
                        .with_cidr(format!("10.{n}.{s}.0/24"))
                };
                first_subnet.get_or_insert_with(|| name.clone());
                tasks.insert(name, subnet);
            }
        }

        if let (Some(description), Some(subnet)) = (&self.load_balancer, &first_subnet) {
            tasks.insert(
                "lb",
                LoadBalancer {
                    description: description.clone(),
                    ..LoadBalancer::named("lb").on_subnet(subnet)
                },
            );
        }

        for (v, (size_gb, team)) in self.volumes.iter().enumerate() {
            let name = format!("vol-{v}");
            let mut volume = Volume::named(&name).with_size_gb(*size_gb);
            if let Some(team) = team {
                volume = volume.with_tag("team", team);
            }
            tasks.insert(name, volume);
        }
        tasks
    }
}

fn three_state<T, S>(value: S) -> impl Strategy<Value = Field<T>>
where
    T: Clone + std::fmt::Debug + 'static,
    S: Strategy<Value = T> + 'static,
{
    prop_oneof![
        Just(Field::Unset),
        Just(Field::Cleared),
        value.prop_map(Field::Set),
    ]
}

fn desired_shape() -> impl Strategy<Value = DesiredShape> {
    let dns_servers = proptest::collection::vec("10\\.0\\.0\\.[1-9]", 0..3);
    let network = (
        three_state(any::<bool>()),
        proptest::collection::vec(three_state(dns_servers), 0..3),
    )
        .prop_map(|(admin_state_up, subnets)| NetworkShape {
            admin_state_up,
            subnets,
        });
    (
        proptest::collection::vec(network, 1..4),
        proptest::option::of(three_state("[a-z ]{1,12}")),
        proptest::collection::vec((1_u32..500, proptest::option::of("[a-z]{1,6}")), 0..3),
    )
        .prop_map(|(networks, load_balancer, volumes)| DesiredShape {
            networks,
            load_balancer,
            volumes,
        })
}

/// Both reports and the number of writes made by the second run.
fn converge_twice(shape: &DesiredShape) -> Option<(RunReport, RunReport, usize)> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .ok()?;
    runtime.block_on(async {
        let cloud = Arc::new(MemoryCloud::new());
        let runner = RunnerBuilder::new()
            .with_adapters(cloud.adapters())
            .read_backoff(BackoffPolicy::immediate(1))
            .write_backoff(BackoffPolicy::immediate(1))
            .build()
            .ok()?;
        let first = runner.run(&mut shape.tasks()).await.ok()?;
        cloud.clear_calls().await;
        let second = runner.run(&mut shape.tasks()).await.ok()?;
        Some((first, second, cloud.writes().await.len()))
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_second_run_changes_nothing(shape in desired_shape()) {
        let outcome = converge_twice(&shape);
        prop_assert!(outcome.is_some());
        let Some((first, second, writes)) = outcome else {
            return Ok(());
        };

        prop_assert!(first.is_converged(), "first run: {:?}", first);
        prop_assert_eq!(second.status, RunStatus::ConvergedWithNoChanges);
        prop_assert!(second.outcomes.iter().all(|o| o.state == TaskState::Skipped));
        prop_assert_eq!(writes, 0);
    }
}
