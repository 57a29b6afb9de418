mod common;

use anyhow::Result;
use common::{init_log, wait_for};
use std::thread::sleep;
use std::time::Duration;
use ttlmap::{Config, ExpiringMap, Expiry};

const TICK: Duration = Duration::from_millis(20);

#[test]
fn background_reaper_evicts_idle_entries() -> Result<()> {
    init_log();
    let m: ExpiringMap<String, u32> = Config::new(2).interval(TICK).build()?;
    m.put("a".into(), 1);
    assert!(wait_for(Duration::from_secs(5), || m.is_empty()));
    assert_eq!(m.get("a"), None);
    assert!(m.metrics().evictions >= 1);
    Ok(())
}

#[test]
fn frequently_accessed_entry_survives() -> Result<()> {
    init_log();
    let m: ExpiringMap<String, u32> = Config::new(10).interval(TICK).build()?;
    m.put("hot".into(), 1);
    m.put("cold".into(), 2);
    // keep "hot" alive well beyond its idle budget of 200ms
    for _ in 0..40 {
        assert_eq!(m.get("hot"), Some(1));
        sleep(Duration::from_millis(10));
    }
    assert!(wait_for(Duration::from_secs(5), || !m.contains_key("cold")));
    assert!(m.contains_key("hot"));
    Ok(())
}

#[test]
fn countdown_mode_in_background() -> Result<()> {
    init_log();
    let m: ExpiringMap<u64, u64> = Config::new(1)
        .expiry(Expiry::Countdown)
        .interval(TICK)
        .build()?;
    m.put_all((0..1000).map(|i| (i, i * i)));
    assert!(wait_for(Duration::from_secs(5), || m.is_empty()));
    assert_eq!(m.metrics().evictions, 1000);
    Ok(())
}

#[test]
fn no_ticks_after_stop() -> Result<()> {
    init_log();
    let mut m: ExpiringMap<String, u32> = Config::new(0).interval(TICK).build()?;
    assert!(wait_for(Duration::from_secs(5), || m.metrics().ticks > 0));
    m.stop();
    assert!(!m.is_reaping());
    let ticks = m.metrics().ticks;
    m.put("a".into(), 1);
    sleep(TICK * 5);
    assert_eq!(m.metrics().ticks, ticks);
    assert_eq!(m.get("a"), Some(1));
    // manual passes still work
    assert_eq!(m.reap(), 1);
    Ok(())
}

#[test]
fn drop_joins_reaper() -> Result<()> {
    init_log();
    let m: ExpiringMap<String, u32> = Config::new(1).interval(TICK).build()?;
    m.put("a".into(), 1);
    drop(m);
    Ok(())
}

#[test]
fn manual_schedule_never_ticks_on_its_own() -> Result<()> {
    init_log();
    let m: ExpiringMap<String, u32> = Config::new(0).manual().build()?;
    m.put("a".into(), 1);
    assert!(!m.is_reaping());
    sleep(Duration::from_millis(100));
    assert_eq!(m.metrics().ticks, 0);
    assert!(m.contains_key("a"));
    Ok(())
}
