//! vmscaled: the vmscale daemon.
//!
//! # Usage
//!
//! ```text
//! vmscaled counter create --name cpu --provider VirtualRouter --source cpu --value cpu
//! vmscaled condition create --counter-id 1 --operator GT --threshold 80
//! vmscaled policy create --condition-ids 1 --action ScaleUp --duration 60
//! vmscaled group create --lb-id 7 --min-members 1 --max-members 4 --member-port 80 \
//!     --interval 30 --scale-up-policy-ids 1
//! vmscaled run --data-dir /var/lib/vmscale
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use vmscale_core::VmscaleConfig;
use vmscale_policy::{CreateAutoScalePolicy, CreateCondition, CreateCounter, CreateVmGroup};
use vmscale_state::GroupState;

use vmscaled::{commands, logging};

#[derive(Parser)]
#[command(
    name = "vmscaled",
    about = "vmscale: metric-driven VM group autoscaling",
    version,
    propagate_version = true
)]
struct Cli {
    /// Path to vmscale.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory, overriding [store].data_dir.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scaling engine until Ctrl-C.
    Run,
    /// Manage counters.
    Counter {
        #[command(subcommand)]
        action: CounterAction,
    },
    /// Manage conditions.
    Condition {
        #[command(subcommand)]
        action: ConditionAction,
    },
    /// Manage autoscale policies.
    Policy {
        #[command(subcommand)]
        action: PolicyAction,
    },
    /// Manage VM groups.
    Group {
        #[command(subcommand)]
        action: GroupAction,
    },
    /// Record metric samples.
    Metrics {
        #[command(subcommand)]
        action: MetricsAction,
    },
}

#[derive(Subcommand)]
enum CounterAction {
    Create {
        #[arg(long)]
        name: String,
        /// VirtualRouter, VpcVirtualRouter or Netscaler.
        #[arg(long)]
        provider: String,
        /// cpu, memory, virtualrouter, netscaler or snmp.
        #[arg(long)]
        source: String,
        /// Provider-specific counter identifier.
        #[arg(long)]
        value: String,
    },
}

#[derive(Subcommand)]
enum ConditionAction {
    Create {
        #[arg(long)]
        counter_id: u64,
        /// EQ, GT, GE, LT or LE.
        #[arg(long)]
        operator: String,
        #[arg(long, allow_negative_numbers = true)]
        threshold: f64,
        #[arg(long)]
        account: Option<u64>,
        #[arg(long)]
        domain_id: Option<u64>,
    },
}

#[derive(Subcommand)]
enum PolicyAction {
    Create {
        /// Comma-separated condition ids.
        #[arg(long, value_delimiter = ',')]
        condition_ids: Vec<u64>,
        /// ScaleUp or ScaleDown.
        #[arg(long)]
        action: String,
        /// Seconds the conditions must hold before firing.
        #[arg(long, allow_negative_numbers = true)]
        duration: i64,
        /// Seconds after a fire before the policy may fire again.
        #[arg(long, allow_negative_numbers = true)]
        quiet_time: Option<i64>,
        #[arg(long)]
        account: Option<u64>,
        #[arg(long)]
        domain_id: Option<u64>,
    },
}

#[derive(Subcommand)]
enum GroupAction {
    Create {
        #[arg(long)]
        lb_id: u64,
        #[arg(long, allow_negative_numbers = true)]
        min_members: i64,
        #[arg(long, allow_negative_numbers = true)]
        max_members: i64,
        #[arg(long, allow_negative_numbers = true)]
        member_port: i64,
        /// Evaluation interval in seconds.
        #[arg(long, allow_negative_numbers = true)]
        interval: i64,
        /// Seconds a removed member keeps serving before destruction.
        #[arg(long, default_value = "0", allow_negative_numbers = true)]
        destroy_vm_grace_period: i64,
        #[arg(long, value_delimiter = ',')]
        scale_up_policy_ids: Vec<u64>,
        #[arg(long, value_delimiter = ',')]
        scale_down_policy_ids: Vec<u64>,
    },
    List,
    Enable { id: u64 },
    Disable { id: u64 },
    Delete { id: u64 },
}

#[derive(Subcommand)]
enum MetricsAction {
    Record {
        #[arg(long)]
        group_id: u64,
        #[arg(long)]
        counter_id: u64,
        #[arg(long, allow_negative_numbers = true)]
        value: f64,
    },
}

fn load_config(cli: &Cli) -> anyhow::Result<VmscaleConfig> {
    let mut config = match &cli.config {
        Some(path) => VmscaleConfig::from_file(path)?,
        None => VmscaleConfig::default(),
    };
    if let Some(dir) = &cli.data_dir {
        config.store.data_dir = dir.clone();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    logging::init(&config.log)?;

    let store = commands::open_store(&config)?;
    let manager = commands::manager(&store, &config);

    match cli.command {
        Command::Run => commands::run(store, &config).await,
        Command::Counter {
            action:
                CounterAction::Create {
                    name,
                    provider,
                    source,
                    value,
                },
        } => commands::create_counter(
            &manager,
            CreateCounter {
                name,
                provider,
                source,
                value,
            },
        ),
        Command::Condition {
            action:
                ConditionAction::Create {
                    counter_id,
                    operator,
                    threshold,
                    account,
                    domain_id,
                },
        } => commands::create_condition(
            &manager,
            CreateCondition {
                counter_id,
                operator,
                threshold,
                account_id: account,
                domain_id,
                project_id: None,
            },
        ),
        Command::Policy {
            action:
                PolicyAction::Create {
                    condition_ids,
                    action,
                    duration,
                    quiet_time,
                    account,
                    domain_id,
                },
        } => commands::create_policy(
            &manager,
            CreateAutoScalePolicy {
                condition_ids,
                action,
                duration,
                quiet_time,
                account_id: account,
                domain_id,
            },
        ),
        Command::Group { action } => match action {
            GroupAction::Create {
                lb_id,
                min_members,
                max_members,
                member_port,
                interval,
                destroy_vm_grace_period,
                scale_up_policy_ids,
                scale_down_policy_ids,
            } => commands::create_group(
                &manager,
                CreateVmGroup {
                    load_balancer_id: lb_id,
                    min_members,
                    max_members,
                    member_port,
                    interval,
                    destroy_vm_grace_period,
                    scale_up_policy_ids,
                    scale_down_policy_ids,
                },
            ),
            GroupAction::List => commands::list_groups(&manager),
            GroupAction::Enable { id } => {
                commands::set_group_state(&manager, id, GroupState::Enabled)
            }
            GroupAction::Disable { id } => {
                commands::set_group_state(&manager, id, GroupState::Disabled)
            }
            GroupAction::Delete { id } => commands::delete_group(&manager, id),
        },
        Command::Metrics {
            action:
                MetricsAction::Record {
                    group_id,
                    counter_id,
                    value,
                },
        } => commands::record_metric(&store, group_id, counter_id, value),
    }
}
