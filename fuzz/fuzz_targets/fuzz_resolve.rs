#![no_main]

use std::collections::BTreeMap;

use libfuzzer_sys::fuzz_target;
use skirmish::engine;
use skirmish::model::{CombatEncounter, CombatantState, RoundAction};

// Layout: 8 seed bytes, then 6 bytes per participant
// (fighters: u16, shields: u16, mobility, action byte).
fuzz_target!(|data: &[u8]| {
    let Some((seed, rest)) = data.split_first_chunk::<8>() else {
        return;
    };
    let mut enc = CombatEncounter::new("fuzz", 1).with_seed(u64::from_le_bytes(*seed));

    let chunks: Vec<&[u8]> = rest.chunks_exact(6).take(8).collect();
    for (n, chunk) in chunks.iter().enumerate() {
        let fighters = u32::from(u16::from_le_bytes([chunk[0], chunk[1]]));
        let shields = u32::from(u16::from_le_bytes([chunk[2], chunk[3]]));
        let state = if chunk[4] == 0xff {
            CombatantState::garrison(format!("p{n}"), "garrison", fighters, "p0")
        } else {
            CombatantState::character(format!("p{n}"), "ship", fighters, shields, u32::from(chunk[4] % 8))
        };
        enc.add_participant(state);
    }
    if enc.participants.is_empty() {
        return;
    }

    let ids: Vec<String> = enc.participants.keys().cloned().collect();
    let mut actions = BTreeMap::new();
    for (id, chunk) in ids.iter().zip(&chunks) {
        let byte = chunk[5];
        let action = match byte % 5 {
            0 => RoundAction::attack(ids[usize::from(byte / 5) % ids.len()].clone(), u32::from(byte)),
            1 => RoundAction::brace(),
            2 => RoundAction::flee(u32::from(byte)),
            3 => RoundAction::pay(None),
            _ => continue,
        };
        actions.insert(id.clone(), action);
    }

    let first = engine::resolve(&enc, &actions);
    let second = engine::resolve(&enc, &actions);
    assert_eq!(first, second, "resolution must be deterministic");
    for (id, p) in &enc.participants {
        assert!(first.fighters_remaining[id] <= p.fighters);
    }
});
