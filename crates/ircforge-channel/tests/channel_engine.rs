//! Integration tests for the channel engine: join gating, modes, lists
//! and the command batches a join produces.

use std::sync::Arc;

use ircforge_channel::{ChannelConfig, ChannelError, ChannelManager, ListKind, ModeChange};
use ircforge_protocol::Command;

// =========================================================================
// Helpers
// =========================================================================

fn full(nick: &str) -> String {
    format!("{nick}!{nick}@users.example")
}

fn manager() -> ChannelManager {
    ChannelManager::new(ChannelConfig {
        server_name: "irc.test".into(),
        ..ChannelConfig::default()
    })
}

/// Creates `#room` with `op` as its operator and `others` as members.
fn room_with(mgr: &ChannelManager, op: &str, others: &[&str]) {
    mgr.join(op, &full(op), "#room", None).unwrap();
    for nick in others {
        mgr.join(nick, &full(nick), "#room", None).unwrap();
    }
}

fn params(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn written(commands: &[Box<dyn Command>]) -> Vec<String> {
    commands.iter().map(|c| c.write()).collect()
}

// =========================================================================
// Join batches
// =========================================================================

#[test]
fn test_join_joiner_batch_echo_then_names() {
    let mgr = manager();
    room_with(&mgr, "alice", &[]);

    let result = mgr.join("bob", &full("bob"), "#room", None).unwrap();

    assert_eq!(
        written(&result.joiner_commands),
        vec![
            ":bob!bob@users.example JOIN #room",
            ":irc.test 353 bob = #room :@alice bob",
            ":irc.test 366 bob #room :End of /NAMES list",
        ]
    );
}

#[test]
fn test_join_with_topic_includes_332_and_333() {
    let mgr = manager();
    room_with(&mgr, "alice", &[]);
    mgr.set_topic("alice", &full("alice"), "#room", "welcome all").unwrap();

    let result = mgr.join("bob", &full("bob"), "#room", None).unwrap();
    let lines = written(&result.joiner_commands);

    assert_eq!(lines.len(), 5);
    assert_eq!(lines[1], ":irc.test 332 bob #room :welcome all");
    assert!(lines[2].starts_with(":irc.test 333 bob #room alice!alice@users.example :"));
}

#[test]
fn test_join_member_batch_one_join_per_existing_member() {
    let mgr = manager();
    room_with(&mgr, "alice", &["carol"]);

    let result = mgr.join("bob", &full("bob"), "#room", None).unwrap();

    assert_eq!(result.member_commands.len(), 2);
    for nick in ["alice", "carol"] {
        let commands = &result.member_commands[nick];
        assert_eq!(written(commands), vec![":bob!bob@users.example JOIN #room"]);
    }
    assert!(!result.member_commands.contains_key("bob"));
}

// =========================================================================
// Join gating
// =========================================================================

#[test]
fn test_join_invite_only_without_invite_is_refused() {
    let mgr = manager();
    room_with(&mgr, "alice", &[]);
    mgr.apply_modes("alice", &full("alice"), "#room", "+i", &[]).unwrap();

    let err = mgr.join("bob", &full("bob"), "#room", None).unwrap_err();

    assert_eq!(err, ChannelError::InviteOnly("#room".into()));
    assert_eq!(err.numeric(), 473);
}

#[test]
fn test_join_invite_only_with_invite_succeeds_and_consumes_invite() {
    let mgr = manager();
    room_with(&mgr, "alice", &[]);
    mgr.apply_modes("alice", &full("alice"), "#room", "+i", &[]).unwrap();
    mgr.invite("alice", &full("alice"), "bob", "#room").unwrap();

    mgr.join("bob", &full("bob"), "#room", None).unwrap();

    let channel = mgr.get("#room").unwrap();
    assert!(channel.is_member("bob"));
    assert!(!channel.is_invited("bob"));
}

#[test]
fn test_join_invite_only_with_invite_exception_succeeds() {
    let mgr = manager();
    room_with(&mgr, "alice", &[]);
    mgr.apply_modes(
        "alice",
        &full("alice"),
        "#room",
        "+iI",
        &params(&["*!*@users.example"]),
    )
    .unwrap();

    assert!(mgr.join("bob", &full("bob"), "#room", None).is_ok());
}

#[test]
fn test_join_full_channel_is_refused() {
    let mgr = manager();
    room_with(&mgr, "alice", &["bob"]);
    mgr.apply_modes("alice", &full("alice"), "#room", "+l", &params(&["2"])).unwrap();

    let err = mgr.join("carol", &full("carol"), "#room", None).unwrap_err();

    assert_eq!(err, ChannelError::ChannelFull("#room".into()));
}

#[test]
fn test_join_bad_key_is_refused_and_right_key_accepted() {
    let mgr = manager();
    room_with(&mgr, "alice", &[]);
    mgr.apply_modes("alice", &full("alice"), "#room", "+k", &params(&["sesame"])).unwrap();

    assert_eq!(
        mgr.join("bob", &full("bob"), "#room", None).unwrap_err(),
        ChannelError::BadKey("#room".into())
    );
    assert_eq!(
        mgr.join("bob", &full("bob"), "#room", Some("wrong")).unwrap_err(),
        ChannelError::BadKey("#room".into())
    );
    assert!(mgr.join("bob", &full("bob"), "#room", Some("sesame")).is_ok());
}

#[test]
fn test_join_banned_unless_excepted() {
    let mgr = manager();
    room_with(&mgr, "alice", &[]);
    mgr.apply_modes("alice", &full("alice"), "#room", "+b", &params(&["*@users.example"])).unwrap();

    assert_eq!(
        mgr.join("bob", &full("bob"), "#room", None).unwrap_err(),
        ChannelError::Banned("#room".into())
    );

    mgr.apply_modes("alice", &full("alice"), "#room", "+e", &params(&["bob"])).unwrap();
    assert!(mgr.join("bob", &full("bob"), "#room", None).is_ok());
}

// =========================================================================
// Modes
// =========================================================================

#[test]
fn test_apply_modes_key_and_limit_broadcast_one_line() {
    let mgr = manager();
    room_with(&mgr, "alice", &["bob"]);

    let (changes, broadcast) = mgr
        .apply_modes("alice", &full("alice"), "#room", "+kl", &params(&["secret", "10"]))
        .unwrap();

    assert_eq!(
        changes,
        vec![
            ModeChange::add('k', Some("secret".into())),
            ModeChange::add('l', Some("10".into())),
        ]
    );
    let broadcast = broadcast.unwrap();
    assert_eq!(broadcast.recipients, vec!["alice", "bob"]);
    assert_eq!(
        broadcast.command.write(),
        ":alice!alice@users.example MODE #room +kl secret 10"
    );
}

#[test]
fn test_apply_modes_repeat_is_silent() {
    let mgr = manager();
    room_with(&mgr, "alice", &[]);
    mgr.apply_modes("alice", &full("alice"), "#room", "+m", &[]).unwrap();

    let (changes, broadcast) = mgr.apply_modes("alice", &full("alice"), "#room", "+m", &[]).unwrap();

    assert!(changes.is_empty());
    assert!(broadcast.is_none());
}

#[test]
fn test_apply_modes_non_operator_is_refused() {
    let mgr = manager();
    room_with(&mgr, "alice", &["bob"]);

    let err = mgr.apply_modes("bob", &full("bob"), "#room", "+i", &[]).unwrap_err();

    assert_eq!(err, ChannelError::NotOperator("#room".into()));
    assert!(!mgr.get("#room").unwrap().has_mode('i'));
}

#[test]
fn test_apply_modes_ban_list_is_normalized() {
    let mgr = manager();
    room_with(&mgr, "alice", &[]);
    mgr.apply_modes("alice", &full("alice"), "#room", "+bb", &params(&["eve", "*@bad.host"])).unwrap();

    let mut masks: Vec<String> = mgr
        .get("#room")
        .unwrap()
        .list_entries(ListKind::Ban)
        .into_iter()
        .map(|e| e.mask)
        .collect();
    masks.sort();

    assert_eq!(masks, vec!["*!*@bad.host", "eve!*@*"]);
}

#[test]
fn test_prefixed_nickname_after_voice_and_op() {
    let mgr = manager();
    room_with(&mgr, "alice", &["bob", "carol"]);
    mgr.apply_modes("alice", &full("alice"), "#room", "+v", &params(&["bob"])).unwrap();

    let channel = mgr.get("#room").unwrap();
    assert_eq!(channel.prefixed_nickname("alice").as_deref(), Some("@alice"));
    assert_eq!(channel.prefixed_nickname("bob").as_deref(), Some("+bob"));
    assert_eq!(channel.prefixed_nickname("carol").as_deref(), Some("carol"));
    assert_eq!(channel.prefixed_nickname("dave"), None);
}

// =========================================================================
// Messaging, topic, part, quit
// =========================================================================

#[test]
fn test_message_recipients_excludes_sender() {
    let mgr = manager();
    room_with(&mgr, "alice", &["bob", "carol"]);

    let recipients = mgr.message_recipients("bob", &full("bob"), "#room").unwrap();

    assert_eq!(recipients, vec!["alice", "carol"]);
}

#[test]
fn test_message_recipients_outsider_blocked_by_no_external() {
    let mgr = manager();
    room_with(&mgr, "alice", &[]);

    let err = mgr.message_recipients("eve", &full("eve"), "#room").unwrap_err();

    assert_eq!(err, ChannelError::CannotSend("#room".into()));
    assert_eq!(err.numeric(), 404);
}

#[test]
fn test_message_recipients_moderated_unvoiced_blocked() {
    let mgr = manager();
    room_with(&mgr, "alice", &["bob"]);
    mgr.apply_modes("alice", &full("alice"), "#room", "+m", &[]).unwrap();

    assert!(mgr.message_recipients("bob", &full("bob"), "#room").is_err());
    assert!(mgr.message_recipients("alice", &full("alice"), "#room").is_ok());
}

#[test]
fn test_set_topic_locked_requires_operator() {
    let mgr = manager();
    room_with(&mgr, "alice", &["bob"]);

    let err = mgr.set_topic("bob", &full("bob"), "#room", "mine").unwrap_err();
    assert_eq!(err, ChannelError::NotOperator("#room".into()));

    mgr.apply_modes("alice", &full("alice"), "#room", "-t", &[]).unwrap();
    let broadcast = mgr.set_topic("bob", &full("bob"), "#room", "mine").unwrap();
    assert_eq!(broadcast.command.write(), ":bob!bob@users.example TOPIC #room :mine");
    assert_eq!(mgr.topic("#room").unwrap().unwrap().text, "mine");
}

#[test]
fn test_topic_query_without_topic_returns_331() {
    let mgr = manager();
    room_with(&mgr, "alice", &[]);

    let replies = mgr.topic_query("alice", "#room").unwrap();

    assert_eq!(written(&replies), vec![":irc.test 331 alice #room :No topic is set"]);
}

#[test]
fn test_part_broadcast_includes_parter() {
    let mgr = manager();
    room_with(&mgr, "alice", &["bob"]);

    let broadcast = mgr.part("bob", &full("bob"), "#room", None).unwrap();

    assert_eq!(broadcast.recipients, vec!["alice", "bob"]);
    assert_eq!(broadcast.command.write(), ":bob!bob@users.example PART #room");
    assert_eq!(mgr.members("#room").unwrap(), vec!["alice"]);
}

#[test]
fn test_remove_from_all_returns_unique_peers_and_drops_empty_channels() {
    let mgr = manager();
    room_with(&mgr, "alice", &["bob"]);
    mgr.join("bob", &full("bob"), "#other", None).unwrap();
    mgr.join("alice", &full("alice"), "#other", None).unwrap();
    mgr.join("bob", &full("bob"), "#solo", None).unwrap();

    let peers = mgr.remove_from_all("bob");

    assert_eq!(peers, vec!["alice"]);
    assert!(mgr.get("#solo").is_none());
    assert!(mgr.channels_of("bob").is_empty());
    assert_eq!(mgr.channel_count(), 2);
}

#[test]
fn test_invite_target_already_member_is_refused() {
    let mgr = manager();
    room_with(&mgr, "alice", &["bob"]);

    let err = mgr.invite("alice", &full("alice"), "bob", "#room").unwrap_err();

    assert_eq!(err.numeric(), 443);
}

#[test]
fn test_invite_writes_invite_line() {
    let mgr = manager();
    room_with(&mgr, "alice", &[]);

    let invite = mgr.invite("alice", &full("alice"), "bob", "#room").unwrap();

    assert_eq!(invite.write(), ":alice!alice@users.example INVITE bob #room");
}

// =========================================================================
// Concurrency
// =========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_join_concurrent_same_nick_joins_once() {
    let mgr = Arc::new(manager());
    room_with(&mgr, "alice", &[]);

    let mut handles = Vec::new();
    for _ in 0..16 {
        let mgr = Arc::clone(&mgr);
        handles.push(tokio::spawn(async move {
            mgr.join("bob", &full("bob"), "#room", None).is_ok()
        }));
    }

    let mut successes = 0;
    for handle in handles {
        if handle.await.unwrap() {
            successes += 1;
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(mgr.get("#room").unwrap().member_count(), 2);
}

#[test]
fn test_join_racing_last_part_never_lands_in_dropped_channel() {
    for _ in 0..2_000 {
        let mgr = Arc::new(manager());
        mgr.join("alice", &full("alice"), "#x", None).unwrap();
        let barrier = Arc::new(std::sync::Barrier::new(2));

        let parter = {
            let (mgr, barrier) = (Arc::clone(&mgr), Arc::clone(&barrier));
            std::thread::spawn(move || {
                barrier.wait();
                mgr.part("alice", &full("alice"), "#x", None).unwrap();
            })
        };
        let joiner = {
            let (mgr, barrier) = (Arc::clone(&mgr), Arc::clone(&barrier));
            std::thread::spawn(move || {
                barrier.wait();
                mgr.join("bob", &full("bob"), "#x", None).is_ok()
            })
        };
        parter.join().unwrap();
        assert!(joiner.join().unwrap());

        let channel = mgr.get("#x").expect("bob's channel is still registered");
        assert_eq!(channel.member_nicknames(), vec!["bob"]);
        assert_eq!(mgr.channels_of("bob").len(), 1);
    }
}

#[test]
fn test_join_racing_first_joiners_one_operator() {
    for _ in 0..500 {
        let mgr = Arc::new(manager());
        let barrier = Arc::new(std::sync::Barrier::new(4));
        let joiners: Vec<_> = ["ann", "ben", "cat", "dan"]
            .into_iter()
            .map(|nick| {
                let (mgr, barrier) = (Arc::clone(&mgr), Arc::clone(&barrier));
                std::thread::spawn(move || {
                    barrier.wait();
                    mgr.join(nick, &full(nick), "#new", None).unwrap().created
                })
            })
            .collect();
        let created = joiners
            .into_iter()
            .map(|j| j.join().unwrap())
            .filter(|&created| created)
            .count();

        let channel = mgr.get("#new").unwrap();
        let operators = channel
            .member_nicknames()
            .iter()
            .filter(|nick| channel.is_operator(nick))
            .count();
        assert_eq!(created, 1);
        assert_eq!(channel.member_count(), 4);
        assert_eq!(operators, 1);
    }
}

// =========================================================================
// Per-user channel index
// =========================================================================

#[test]
fn test_join_cap_follows_part_quit_and_rename() {
    let mgr = ChannelManager::new(ChannelConfig {
        max_channels_per_user: 2,
        ..ChannelConfig::default()
    });
    mgr.join("bob", &full("bob"), "#a", None).unwrap();
    mgr.join("bob", &full("bob"), "#b", None).unwrap();
    assert_eq!(
        mgr.join("bob", &full("bob"), "#c", None).unwrap_err(),
        ChannelError::TooManyChannels("#c".into())
    );

    mgr.part("bob", &full("bob"), "#a", None).unwrap();
    mgr.join("bob", &full("bob"), "#c", None).unwrap();
    assert_eq!(mgr.membership_count("BOB"), 2);

    mgr.rename_member("bob", "rob");
    assert_eq!(mgr.membership_count("bob"), 0);
    let names: Vec<String> = mgr
        .channels_of("rob")
        .iter()
        .map(|c| c.name().to_owned())
        .collect();
    assert_eq!(names, vec!["#b", "#c"]);

    mgr.remove_from_all("rob");
    assert_eq!(mgr.membership_count("rob"), 0);
    assert_eq!(mgr.channel_count(), 0);
}
