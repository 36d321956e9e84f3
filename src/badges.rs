use crate::stats::YearStats;
use serde::Serialize;

pub struct BadgeDef {
    pub id: &'static str,
    pub emoji: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub check: fn(&YearStats) -> bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Badge {
    pub id: &'static str,
    pub emoji: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub earned: bool,
}

pub const BADGE_DEFS: [BadgeDef; 6] = [
    BadgeDef {
        id: "first-day",
        emoji: "🌱",
        title: "Первый день",
        description: "1 день с настроением",
        check: |s| s.filled_days >= 1,
    },
    BadgeDef {
        id: "week-streak",
        emoji: "🔥",
        title: "Первая неделя",
        description: "Стрик 7 дней",
        check: |s| s.longest_streak >= 7,
    },
    BadgeDef {
        id: "month-streak",
        emoji: "🏅",
        title: "Месяц",
        description: "Стрик 30 дней",
        check: |s| s.longest_streak >= 30,
    },
    BadgeDef {
        id: "hundred-days",
        emoji: "💯",
        title: "100 дней",
        description: "100 заполненных дней",
        check: |s| s.filled_days >= 100,
    },
    BadgeDef {
        id: "half-year",
        emoji: "⭐",
        title: "Полгода",
        description: "183 заполненных дня",
        check: |s| s.filled_days >= 183,
    },
    BadgeDef {
        id: "full-year",
        emoji: "🏆",
        title: "Полный год",
        description: "365 заполненных дней",
        check: |s| s.filled_days >= 365,
    },
];

impl BadgeDef {
    pub fn evaluate(&self, stats: &YearStats) -> Badge {
        Badge {
            id: self.id,
            emoji: self.emoji,
            title: self.title,
            description: self.description,
            earned: (self.check)(stats),
        }
    }
}

/// Every badge definition, each checked against `stats` on its own.
pub fn get_earned_badges(stats: &YearStats) -> Vec<Badge> {
    BADGE_DEFS.iter().map(|def| def.evaluate(stats)).collect()
}
