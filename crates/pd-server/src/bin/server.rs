use clap::Parser;
use pd::config::{ReplicationConfig, ScheduleConfig};

#[derive(Parser, Debug)]
#[command(name = "pd-server", version, author, about = "Placement driver server")]
struct Cli {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:2380")]
    addr: std::net::SocketAddr,

    /// Cluster id; stores/regions are namespaced under this in the
    /// metadata store's key space.
    #[arg(long, default_value_t = 1)]
    cluster_id: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cluster = pd_server::single_node_cluster(cli.cluster_id, ScheduleConfig::default(), ReplicationConfig::default())?;
    pd_server::spawn_background_loops(cluster.clone());

    tracing::info!(addr = %cli.addr, "placement driver listening");
    pd_server::serve(cli.addr, cluster).await
}
