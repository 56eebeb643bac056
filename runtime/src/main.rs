//! CLI entry point. `hft-runtime [config-path]` boots every subsystem and
//! serves until `Ctrl-C`. `hft-runtime [config-path] place-order <account>
//! <strategy> <instrument> buy|sell open|close|closetoday|closeyesterday
//! <volume> <price>` is a one-shot mode that places a single order and
//! exits, exercising the risk-reject (`3`) and state-machine-reject (`4`)
//! exit codes directly.

use std::collections::HashMap;
use std::sync::Arc;

use hft_core::dispatch::Priority;
use hft_core::market::MarketSnapshot;
use hft_core::order::{Offset, OrderEvent, OrderIntent, OrderType, Side};
use hft_execution::ExecutionError;
use hft_runtime::{Runtime, RuntimeConfig};
use hft_store::HashStore;
use hft_strategy::{StrategyEngine, StrategyEvent};
use hft_transport::TransportEvent;

#[tokio::main]
async fn main() {
    hft_core::logging::init_logging();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (config_path, rest) = match args.first() {
        Some(first) if !first.ends_with(".toml") && first != "place-order" => {
            (None, args.as_slice())
        }
        Some(first) if first.ends_with(".toml") => (Some(first.clone()), &args[1..]),
        _ => (None, args.as_slice()),
    };

    let contents = match &config_path {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) => {
                tracing::error!(path, %err, "failed to read config file");
                std::process::exit(1);
            }
        },
        None => String::new(),
    };

    let config = match RuntimeConfig::load(&contents) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(%err, "config load failed");
            std::process::exit(err.exit_code());
        }
    };

    let runtime = match Runtime::bootstrap(&config).await {
        Ok(runtime) => runtime,
        Err(err) => {
            tracing::error!(%err, "runtime bootstrap failed");
            std::process::exit(err.exit_code());
        }
    };

    if let Err(err) = runtime.check_storage_health().await {
        tracing::error!(%err, "storage health check failed");
        std::process::exit(err.exit_code());
    }

    match rest.first().map(String::as_str) {
        Some("place-order") => std::process::exit(run_place_order(&runtime, &rest[1..]).await),
        _ => serve(runtime).await,
    }
}

async fn serve(runtime: Runtime) {
    tracing::info!("runtime ready, serving until ctrl-c");
    let Runtime {
        mut events,
        mut intents,
        session,
        execution,
        strategy_engine,
        hash_store,
        dispatcher,
        critical_queue,
        account_id,
        ..
    } = runtime;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received");
                session.disconnect().await;
                dispatcher.stop().await;
                critical_queue.stop().await;
                break;
            }
            Some(event) = events.recv() => {
                route_transport_event(event, &dispatcher, &critical_queue, &strategy_engine, &hash_store).await;
            }
            Some(intent) = intents.recv() => {
                let execution = execution.clone();
                let account_id = account_id.clone();
                tokio::spawn(async move {
                    let trace_id = intent.trace_id.clone();
                    if let Err(err) = execution.place_order(intent.into_order_intent(account_id)).await {
                        tracing::warn!(%err, trace_id, "strategy-emitted order rejected");
                    }
                });
            }
        }
    }
}

/// Fans a raw transport event out to the hash store and the strategy
/// engine. Market ticks go through the general-purpose dispatcher at `High`
/// priority (matching [`MarketSnapshot`]'s own documented priority); order
/// events go through the bounded critical queue, since an order-state
/// transition silently dropped under load is the one failure this runtime
/// cannot tolerate. Session state changes are logged directly -- they're
/// rare enough that queuing them buys nothing.
async fn route_transport_event(
    event: TransportEvent,
    dispatcher: &hft_core::dispatch::EventDispatcher,
    critical_queue: &hft_core::dispatch::CriticalQueue,
    strategy_engine: &Arc<StrategyEngine>,
    hash_store: &Arc<dyn HashStore>,
) {
    match event {
        TransportEvent::TraderState(state) => {
            tracing::debug!(?state, "trader session state changed");
        }
        TransportEvent::MarketState(state) => {
            tracing::debug!(?state, "market session state changed");
        }
        TransportEvent::Market(snapshot) => {
            let hash_store = hash_store.clone();
            let strategy_engine = strategy_engine.clone();
            dispatcher.post(
                Box::new(move || {
                    tokio::spawn(async move {
                        let key = format!("market:tick:{}:latest", snapshot.instrument_id);
                        if let Err(err) = hash_store.hset(&key, market_snapshot_fields(&snapshot)).await {
                            tracing::warn!(%err, key, "failed to cache market snapshot");
                        }
                        strategy_engine.post(StrategyEvent::State(snapshot));
                    });
                }),
                Priority::High,
            );
        }
        TransportEvent::Order(order_event) => {
            let hash_store = hash_store.clone();
            let strategy_engine = strategy_engine.clone();
            critical_queue
                .post(
                    Box::new(move || {
                        tokio::spawn(async move {
                            let key = format!("quant:rt:order:{}", order_event.client_order_id);
                            if let Err(err) = hash_store.hset(&key, order_event_fields(&order_event)).await {
                                tracing::warn!(%err, key, "failed to cache order event");
                            }
                            strategy_engine.post(StrategyEvent::Order(order_event));
                        });
                    }),
                    true,
                )
                .await;
        }
    }
}

fn market_snapshot_fields(snapshot: &MarketSnapshot) -> HashMap<String, String> {
    let mut fields = HashMap::new();
    fields.insert("instrument_id".into(), snapshot.instrument_id.clone());
    fields.insert("last_price".into(), snapshot.last_price.to_string());
    fields.insert("bid_price_1".into(), snapshot.bid_price_1.to_string());
    fields.insert("bid_volume_1".into(), snapshot.bid_volume_1.to_string());
    fields.insert("ask_price_1".into(), snapshot.ask_price_1.to_string());
    fields.insert("ask_volume_1".into(), snapshot.ask_volume_1.to_string());
    fields.insert("volume".into(), snapshot.volume.to_string());
    fields.insert("ts_ns".into(), snapshot.recv_ts_ns.to_string());
    fields
}

fn order_event_fields(event: &OrderEvent) -> HashMap<String, String> {
    let mut fields = HashMap::new();
    fields.insert("client_order_id".into(), event.client_order_id.clone());
    fields.insert("exchange_order_id".into(), event.exchange_order_id.clone());
    fields.insert("instrument_id".into(), event.instrument_id.clone());
    fields.insert("status".into(), format!("{:?}", event.status));
    fields.insert("total_volume".into(), event.total_volume.to_string());
    fields.insert("filled_volume".into(), event.filled_volume.to_string());
    fields.insert("avg_fill_price".into(), event.avg_fill_price.to_string());
    fields.insert("ts_ns".into(), event.recv_ts_ns.to_string());
    fields
}

/// Parses `account strategy instrument side offset volume price` and places
/// it once. Returns the process exit code: `0` on success, `3` on a risk
/// rejection, `4` when the broker/state-machine rejected the order (every
/// other `ExecutionError` also maps here, since none of them are config or
/// connectivity failures at this point).
async fn run_place_order(runtime: &Runtime, args: &[String]) -> i32 {
    let [account_id, strategy_id, instrument_id, side, offset, volume, price] = args else {
        eprintln!("usage: place-order <account> <strategy> <instrument> buy|sell open|close|closetoday|closeyesterday <volume> <price>");
        return 1;
    };

    let side = match side.to_lowercase().as_str() {
        "buy" => Side::Buy,
        "sell" => Side::Sell,
        other => {
            eprintln!("unknown side: {other}");
            return 1;
        }
    };
    let offset = match offset.to_lowercase().as_str() {
        "open" => Offset::Open,
        "close" => Offset::Close,
        "closetoday" => Offset::CloseToday,
        "closeyesterday" => Offset::CloseYesterday,
        other => {
            eprintln!("unknown offset: {other}");
            return 1;
        }
    };
    let Ok(volume) = volume.parse::<u32>() else {
        eprintln!("invalid volume: {volume}");
        return 1;
    };
    let Ok(price) = price.parse::<f64>() else {
        eprintln!("invalid price: {price}");
        return 1;
    };

    let intent = OrderIntent {
        account_id: account_id.clone(),
        client_order_id: String::new(),
        strategy_id: strategy_id.clone(),
        instrument_id: instrument_id.clone(),
        side,
        offset,
        order_type: OrderType::Limit,
        volume,
        price,
        trace_id: format!("cli-{account_id}-{strategy_id}"),
        ts_ns: 0,
    };

    match runtime.execution.place_order(intent).await {
        Ok(result) => {
            tracing::info!(client_order_id = %result.client_order_id, "order placed");
            0
        }
        Err(ExecutionError::RiskRejected(reason)) => {
            tracing::warn!(reason, "order rejected by risk check");
            3
        }
        Err(err) => {
            tracing::warn!(%err, "order rejected");
            4
        }
    }
}
