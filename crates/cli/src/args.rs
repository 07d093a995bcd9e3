//! Argument value parsers.

use chrono::NaiveDate;
use volleystat_core::domain::StatLine;
use volleystat_core::utils::parse_date;

/// Accepts `YYYY-MM-DD` and the other formats `parse_date` understands.
pub fn date(input: &str) -> Result<NaiveDate, String> {
    parse_date(input).ok_or_else(|| format!("unrecognised date {input:?}"))
}

/// `PLAYER:ATTACKS:KILLS:ERRORS:BLOCKS:DIGS:ACES`
pub fn stat_line(input: &str) -> Result<StatLine, String> {
    let parts: Vec<&str> = input.split(':').map(str::trim).collect();
    let &[player, attacks, kills, errors, blocks, digs, aces] = parts.as_slice() else {
        return Err(format!(
            "expected PLAYER:ATTACKS:KILLS:ERRORS:BLOCKS:DIGS:ACES, got {input:?}"
        ));
    };

    let count = |name: &str, raw: &str| {
        raw.parse::<u32>()
            .map_err(|_| format!("{name} must be a non-negative whole number, got {raw:?}"))
    };

    Ok(StatLine {
        player_id: player
            .parse()
            .map_err(|_| format!("player id must be a number, got {player:?}"))?,
        attacks: count("attacks", attacks)?,
        kills: count("kills", kills)?,
        errors: count("errors", errors)?,
        blocks: count("blocks", blocks)?,
        digs: count("digs", digs)?,
        aces: count("aces", aces)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stat_line_parses_all_fields() {
        let line = stat_line("4:30:15:3:2:8:1").unwrap();
        assert_eq!(line.player_id, 4);
        assert_eq!(line.attacks, 30);
        assert_eq!(line.kills, 15);
        assert_eq!(line.errors, 3);
        assert_eq!(line.blocks, 2);
        assert_eq!(line.digs, 8);
        assert_eq!(line.aces, 1);
    }

    #[test]
    fn test_stat_line_rejects_wrong_arity() {
        assert!(stat_line("4:30:15").is_err());
        assert!(stat_line("4:30:15:3:2:8:1:9").is_err());
    }

    #[test]
    fn test_stat_line_rejects_negative_counts() {
        let err = stat_line("4:30:-1:3:2:8:1").unwrap_err();
        assert!(err.contains("kills"));
    }

    #[test]
    fn test_date_formats() {
        assert_eq!(date("2025-02-01").unwrap(), NaiveDate::from_ymd_opt(2025, 2, 1).unwrap());
        assert!(date("someday").is_err());
    }
}
