use distributed_cache::cluster::http::HttpChannel;
use distributed_cache::cluster::membership::ClusterView;
use distributed_cache::cluster::partitioner::PartitionManager;
use distributed_cache::cluster::types::Node;
use distributed_cache::store::handlers;
use distributed_cache::store::memory::PartitionStore;
use std::net::SocketAddr;
use std::time::Duration;

/// Every member serves invocations this many ports above its bind address.
const HTTP_PORT_OFFSET: u16 = 1000;

fn http_addr(addr: SocketAddr) -> anyhow::Result<SocketAddr> {
    let port = addr
        .port()
        .checked_add(HTTP_PORT_OFFSET)
        .ok_or_else(|| anyhow::anyhow!("port {} leaves no room for the HTTP port", addr.port()))?;
    Ok(SocketAddr::new(addr.ip(), port))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        // .with_max_level(tracing::Level::DEBUG)
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 3 {
        eprintln!("Usage: {} --bind <addr:port> [--member <addr:port>]...", args[0]);
        eprintln!("Example: {} --bind 127.0.0.1:5000", args[0]);
        eprintln!(
            "Example: {} --bind 127.0.0.1:5001 --member 127.0.0.1:5000",
            args[0]
        );

        std::process::exit(1);
    }

    let mut bind_addr: Option<SocketAddr> = None;
    let mut member_addrs: Vec<SocketAddr> = vec![];

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" | "--member" => {
                let value: SocketAddr = args
                    .get(i + 1)
                    .ok_or_else(|| anyhow::anyhow!("{} needs a value", args[i]))?
                    .parse()?;
                if args[i] == "--bind" {
                    bind_addr = Some(value);
                } else {
                    member_addrs.push(value);
                }
                i += 2;
            }
            _ => {
                i += 1;
            }
        }
    }

    let bind_addr = bind_addr.ok_or_else(|| anyhow::anyhow!("--bind is required"))?;
    let local_http = http_addr(bind_addr)?;

    tracing::info!("Starting node on {}", bind_addr);
    if !member_addrs.is_empty() {
        tracing::info!("Static members: {:?}", member_addrs);
    } else {
        tracing::info!("Starting as single-member cluster");
    }

    // 1. Membership (static member list):
    let mut peers = Vec::with_capacity(member_addrs.len());
    for addr in member_addrs {
        peers.push(Node::new(http_addr(addr)?));
    }
    let membership = ClusterView::with_members(Node::new(local_http), peers);
    tracing::info!("Node ID: {:?}", membership.local_node.id);

    // 2. Storage layer:
    let partitioner = PartitionManager::new(membership.clone());
    let store = PartitionStore::new(partitioner.clone());
    let peers = HttpChannel::new(membership.clone(), partitioner.clone())?;

    // 3. HTTP Router:
    let app = handlers::router(store.clone(), peers);

    // 4. Spawn stats reporter:
    let stats_membership = membership.clone();
    let stats_store = store.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));

        loop {
            interval.tick().await;
            tracing::info!(
                "Cluster stats: {} alive nodes, {} owned partitions, {} caches, {} entries",
                stats_membership.get_alive_members().len(),
                partitioner.my_partitions().len(),
                stats_store.local_cache_count(),
                stats_store.local_entry_count()
            );
        }
    });

    // 5. Start HTTP server:
    tracing::info!("HTTP server listening on {}", local_http);
    tracing::info!("Press Ctrl+C to shutdown");

    let listener = tokio::net::TcpListener::bind(local_http).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

