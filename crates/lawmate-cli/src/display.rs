//! Terminal rendering for answers, conversations and transcripts.
//!
//! Answers go to stdout; progress and diagnostics go to stderr so an answer
//! can be piped on its own.

use std::fmt::Write as _;

use lawmate_core::{Conversation, RiskLevel, Turn};

/// Czech Bar Association lawyer search.
pub const LAWYER_SEARCH_URL: &str = "https://vyhledavac.cak.cz/";

const RULE_WIDTH: usize = 60;

// ── Semaphore ──

pub fn semaphore_label(level: RiskLevel) -> &'static str {
    match level {
        RiskLevel::Green => "🟢 Zelená: nízké riziko",
        RiskLevel::Yellow => "🟡 Žlutá: raději konzultace",
        RiskLevel::Red => "🔴 Červená: řeš s právníkem",
    }
}

// ── Turns ──

/// One answered question as a block of text.
pub fn render_turn(turn: &Turn) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", semaphore_label(turn.risk_level));
    if let Some(notice) = &turn.notice {
        let _ = writeln!(out, "⚠ {notice}");
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", turn.answer_text.trim_end());
    let _ = writeln!(out);
    let _ = writeln!(out, "Doporučení: {}", turn.escalation_advice);
    if turn.risk_level == RiskLevel::Red {
        let _ = writeln!(out, "Najít advokáta: {LAWYER_SEARCH_URL}");
    }

    if !turn.citations.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Zdroje:");
        for c in &turn.citations {
            if c.url.is_empty() {
                let _ = writeln!(out, "  - {}", c.title);
            } else {
                let _ = writeln!(out, "  - {} <{}>", c.title, c.url);
            }
        }
    }

    let _ = writeln!(
        out,
        "\n[{} | {} | {}]",
        turn.domain.label(),
        turn.provider_used,
        turn.created_at.format("%Y-%m-%d %H:%M")
    );
    out
}

pub fn print_turn(turn: &Turn) {
    print!("{}", render_turn(turn));
}

// ── Conversations ──

pub fn render_conversations(conversations: &[Conversation]) -> String {
    if conversations.is_empty() {
        return "Žádné konverzace.\n".into();
    }
    let mut out = String::new();
    for c in conversations {
        let _ = writeln!(
            out,
            "{}  {}  {:<10} {}",
            c.id,
            c.updated_at.format("%Y-%m-%d %H:%M"),
            c.domain.as_str(),
            c.title
        );
    }
    out
}

pub fn print_conversations(conversations: &[Conversation]) {
    print!("{}", render_conversations(conversations));
}

/// Whole conversation, oldest turn first.
pub fn print_transcript(conversation: &Conversation, turns: &[Turn]) {
    println!("=== {} ===", conversation.title);
    println!("{} | {}", conversation.id, conversation.domain.label());
    for turn in turns {
        println!("{}", "─".repeat(RULE_WIDTH));
        println!("> {}", turn.user_message);
        println!();
        print_turn(turn);
    }
    if turns.is_empty() {
        println!("(zatím bez odpovědí)");
    }
}
