use clap::{Args, Parser, Subcommand};
use pd::store::Store;
use pd::types::{RegionId, StoreId};
use pd_client::PdClient;

#[derive(Parser, Debug)]
#[command(name = "pdctl", version, author, about = "Placement driver admin CLI")]
struct Cli {
    /// PD leader address, e.g. http://127.0.0.1:2380
    #[arg(long, default_value = "http://127.0.0.1:2380")]
    addr: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Test connectivity and report whether the cluster is bootstrapped
    IsBootstrapped,
    /// Bootstrap the cluster with a single store and region
    Bootstrap(BootstrapCmd),
    /// Allocate one cluster-unique id
    AllocId,
    /// Allocate a batch of strictly increasing timestamps
    AllocTimestamp(AllocTimestampCmd),
    /// Fetch a store by id
    GetStore(StoreIdCmd),
    /// Register or update a store
    PutStore(PutStoreCmd),
    /// Mark a store Offline
    RemoveStore(StoreIdCmd),
    /// List all known stores
    GetAllStores,
    /// Fetch the region owning a key
    GetRegionByKey(GetRegionByKeyCmd),
    /// Fetch a region by id
    GetRegionById(GetRegionByIdCmd),
    /// Print the current schedule and replication config
    GetClusterConfig,
}

#[derive(Args, Debug)]
struct BootstrapCmd {
    #[arg(long)]
    store_id: u64,
    #[arg(long)]
    address: String,
    #[arg(long)]
    region_id: u64,
    #[arg(long)]
    peer_id: u64,
}

#[derive(Args, Debug)]
struct AllocTimestampCmd {
    #[arg(long, default_value_t = 1)]
    count: u32,
}

#[derive(Args, Debug)]
struct StoreIdCmd {
    #[arg(long)]
    store_id: u64,
}

#[derive(Args, Debug)]
struct PutStoreCmd {
    #[arg(long)]
    store_id: u64,
    #[arg(long)]
    address: String,
}

#[derive(Args, Debug)]
struct GetRegionByKeyCmd {
    #[arg(long)]
    key: String,
}

#[derive(Args, Debug)]
struct GetRegionByIdCmd {
    #[arg(long)]
    region_id: u64,
}

fn print_region(region: &pd::region::Region) {
    println!(
        "region-{} epoch({}, {}) leader={:?} peers={:?}",
        region.id.0, region.epoch.conf_ver, region.epoch.version, region.leader, region.peers
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let mut client = PdClient::connect(cli.addr).await?;

    match cli.command {
        Commands::IsBootstrapped => {
            let bootstrapped = client.is_bootstrapped().await?;
            println!("bootstrapped: {bootstrapped}");
        }
        Commands::Bootstrap(args) => {
            let store = Store::new(StoreId(args.store_id), args.address);
            let region = pd::region::Region::new(
                RegionId(args.region_id),
                vec![],
                vec![],
                vec![pd::types::Peer { id: pd::types::PeerId(args.peer_id), store_id: StoreId(args.store_id) }],
            );
            client.bootstrap(store, region).await?;
            println!("bootstrapped");
        }
        Commands::AllocId => {
            let id = client.alloc_id().await?;
            println!("id: {id}");
        }
        Commands::AllocTimestamp(args) => {
            let (first, last) = client.alloc_timestamp(args.count).await?;
            println!("first: {first}\nlast: {last}");
        }
        Commands::GetStore(args) => {
            let store = client.get_store(StoreId(args.store_id)).await?;
            println!("{store:?}");
        }
        Commands::PutStore(args) => {
            let store = Store::new(StoreId(args.store_id), args.address);
            client.put_store(store).await?;
            println!("ok");
        }
        Commands::RemoveStore(args) => {
            client.remove_store(StoreId(args.store_id)).await?;
            println!("ok");
        }
        Commands::GetAllStores => {
            for store in client.get_all_stores().await? {
                println!("{} {} {:?}", store.id, store.address, store.state);
            }
        }
        Commands::GetRegionByKey(args) => {
            let region = client.get_region_by_key(args.key.into_bytes()).await?;
            print_region(&region);
        }
        Commands::GetRegionById(args) => {
            let region = client.get_region_by_id(RegionId(args.region_id)).await?;
            print_region(&region);
        }
        Commands::GetClusterConfig => {
            let (schedule, replication) = client.get_cluster_config().await?;
            println!("{schedule:?}\n{replication:?}");
        }
    }
    Ok(())
}
