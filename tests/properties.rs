use std::sync::Arc;

use duel_engine::game::{
    battle_outcome, choice_seed, deterministic_index, CardDefinition, EngineConfig, GamePhase,
    GameSession, MatchSetup, PhaseAction, PlayerSetup, PlayerState, RuleEngine, RuleError, Side,
    StaticCardCatalog,
};
use proptest::prelude::*;

fn engine() -> RuleEngine {
    let catalog = Arc::new(StaticCardCatalog::new(vec![CardDefinition::monster(
        "knight", 1500, 1500,
    )]));
    RuleEngine::new(catalog, EngineConfig::default())
}

fn fresh_match(engine: &RuleEngine) -> GameSession {
    let setup = MatchSetup {
        session_id: "prop".into(),
        lobby_id: "lobby".into(),
        players: vec![
            PlayerSetup {
                id: "p1".into(),
                deck: vec!["knight".into(); 40],
            },
            PlayerSetup {
                id: "p2".into(),
                deck: vec!["knight".into(); 40],
            },
        ],
    };
    engine.create_match(&setup, 0).expect("valid setup")
}

fn walk_to_main2(engine: &RuleEngine, session: &mut GameSession) {
    let player_id = session.current_turn_player_id.clone();
    for phase in [
        GamePhase::Standby,
        GamePhase::Main1,
        GamePhase::Battle,
        GamePhase::Main2,
    ] {
        engine
            .advance_phase(
                session,
                &PhaseAction {
                    player_id: player_id.clone(),
                    requested_phase: phase,
                },
            )
            .expect("phases advance in order");
    }
}

proptest! {
    /// Swapping attacker and defender in attack position mirrors the result.
    #[test]
    fn attack_position_battles_are_symmetric(a in 0u32..10_000, b in 0u32..10_000) {
        let forward = battle_outcome(a, b, true);
        let backward = battle_outcome(b, a, true);

        prop_assert_eq!(forward.damage, a.abs_diff(b));
        prop_assert_eq!(forward.damage, backward.damage);
        prop_assert_eq!(forward.attacker_destroyed, backward.defender_destroyed);
        prop_assert_eq!(forward.defender_destroyed, backward.attacker_destroyed);
        let mirrored = forward.damage_to.map(|side| match side {
            Side::Attacker => Side::Defender,
            Side::Defender => Side::Attacker,
        });
        prop_assert_eq!(mirrored, backward.damage_to);
    }

    /// A defending monster never destroys the attacker.
    #[test]
    fn defense_position_spares_the_attacker(a in 0u32..10_000, d in 0u32..10_000) {
        let outcome = battle_outcome(a, d, false);
        prop_assert!(!outcome.attacker_destroyed);
        prop_assert_eq!(outcome.defender_destroyed, a > d);
        if a <= d {
            prop_assert_ne!(outcome.damage_to, Some(Side::Defender));
        }
    }

    #[test]
    fn life_points_never_underflow(start in 0u32..20_000, hits in prop::collection::vec(0u32..5_000, 0..12)) {
        let mut session = GameSession::new(
            "s",
            "l",
            vec![PlayerState::new("a", start), PlayerState::new("b", start)],
        );
        let mut expected = start;
        for hit in hits {
            session.damage_player(None, "b", hit);
            expected = expected.saturating_sub(hit);
            prop_assert_eq!(session.get_player("b").map(|p| p.life_points), Some(expected));
        }
    }

    /// Each accepted end turn advances the turn number by exactly one and
    /// hands the turn to the other player with fresh per-turn flags.
    #[test]
    fn turns_advance_and_alternate(turns in 1usize..16) {
        let engine = engine();
        let mut session = fresh_match(&engine);

        for _ in 0..turns {
            let before_turn = session.turn_number;
            let before_player = session.current_turn_player_id.clone();
            walk_to_main2(&engine, &mut session);

            let result = engine
                .end_turn(&mut session, &before_player)
                .expect("main2 may end the turn");

            prop_assert_eq!(result.new_turn_number, before_turn + 1);
            prop_assert_ne!(&result.new_turn_player_id, &before_player);
            prop_assert_eq!(session.current_phase, GamePhase::Draw);
            prop_assert_eq!(session.trigger_firings, 0);
            for player in &session.players {
                prop_assert!(!player.normal_summoned_this_turn);
                prop_assert!(player.board.iter().all(|entry| !entry.has_attacked));
            }
        }
    }

    #[test]
    fn end_turn_is_gated_on_late_phases(steps in 0usize..4) {
        let engine = engine();
        let mut session = fresh_match(&engine);
        let player_id = session.current_turn_player_id.clone();
        let phases = [GamePhase::Standby, GamePhase::Main1, GamePhase::Battle];
        for phase in phases.iter().take(steps.min(phases.len())) {
            engine
                .advance_phase(&mut session, &PhaseAction { player_id: player_id.clone(), requested_phase: *phase })
                .expect("phases advance in order");
        }
        let before = session.clone();

        let err = engine.end_turn(&mut session, &player_id);
        let is_too_early = matches!(err, Err(RuleError::CannotEndTurnYet { .. }));
        prop_assert!(is_too_early);
        prop_assert_eq!(session, before);
    }

    /// The same session-visible identifiers always pick the same choice.
    #[test]
    fn random_choice_is_reproducible(
        session_id in "[a-z0-9-]{1,24}",
        turn in 1u32..500,
        card in "[a-z0-9:]{1,16}",
        occurrence in 0u32..32,
        sequence in 0u32..8,
        len in 1usize..12,
    ) {
        let seed = choice_seed(&session_id, turn, &card, occurrence, sequence);
        let first = deterministic_index(&seed, len);
        let second = deterministic_index(&choice_seed(&session_id, turn, &card, occurrence, sequence), len);
        prop_assert!(first < len);
        prop_assert_eq!(first, second);
    }
}
