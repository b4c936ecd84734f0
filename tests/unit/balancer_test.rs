//! Unit tests for backend selection

use std::net::SocketAddr;

use nat_relay::proxy::{Balancer, BalancingStrategy, TargetPool};

fn addr(port: u16) -> SocketAddr {
    format!("127.0.0.1:{port}").parse().unwrap()
}

fn pool(ports: &[u16]) -> TargetPool {
    TargetPool::new(ports.iter().map(|p| addr(*p)).collect(), 3, 2)
}

#[test]
fn test_round_robin_cycles() {
    let pool = pool(&[9001, 9002, 9003]);
    let balancer = Balancer::new(BalancingStrategy::RoundRobin);
    let healthy = pool.healthy_snapshot();

    let picks: Vec<SocketAddr> = (0..4)
        .map(|_| balancer.select(&pool, &healthy).unwrap())
        .collect();

    assert_eq!(picks, vec![addr(9001), addr(9002), addr(9003), addr(9001)]);
}

#[test]
fn test_candidates_cover_all_healthy_targets() {
    let pool = pool(&[9001, 9002, 9003]);
    let balancer = Balancer::new(BalancingStrategy::RoundRobin);
    let healthy = pool.healthy_snapshot();

    let candidates = balancer.candidates(&pool, &healthy);
    assert_eq!(candidates.len(), 3);
    for target in healthy.iter() {
        assert!(candidates.contains(target));
    }
}

#[test]
fn test_least_connections_prefers_idle_target() {
    let pool = pool(&[9001, 9002]);
    let balancer = Balancer::new(BalancingStrategy::LeastConnections);
    let healthy = pool.healthy_snapshot();

    let _busy_a = pool.connection_guard(addr(9001));
    let _busy_b = pool.connection_guard(addr(9001));

    assert_eq!(balancer.select(&pool, &healthy), Some(addr(9002)));
}

#[test]
fn test_random_selects_from_healthy_set() {
    let pool = pool(&[9001, 9002, 9003]);
    let balancer = Balancer::new(BalancingStrategy::Random);
    let healthy = pool.healthy_snapshot();

    for _ in 0..16 {
        let pick = balancer.select(&pool, &healthy).unwrap();
        assert!(healthy.contains(&pick));
    }
}

#[test]
fn test_empty_healthy_set_yields_nothing() {
    let pool = pool(&[]);
    let balancer = Balancer::new(BalancingStrategy::RoundRobin);
    let healthy = pool.healthy_snapshot();

    assert_eq!(balancer.select(&pool, &healthy), None);
    assert!(balancer.candidates(&pool, &healthy).is_empty());
}
