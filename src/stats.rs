use crate::store::Registration;
use chrono::DateTime;
use serde::Serialize;
use std::collections::BTreeMap;

/// Aggregate statistics over all registrations
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationStats {
    pub total_teams: usize,
    /// Sum of roster sizes across all teams
    pub total_participants: usize,
    pub universities: BTreeMap<String, UniversityStats>,
    /// Members by year of study
    pub year_distribution: BTreeMap<String, usize>,
    /// Registrations by calendar date (YYYY-MM-DD)
    pub registrations_by_date: BTreeMap<String, usize>,
    /// Teams by roster size, 1 through 4
    pub team_size_distribution: BTreeMap<usize, usize>,
    /// Members with a non-empty IEEE number
    pub ieee_members: usize,
    /// Members with a non-empty Kaggle id
    pub kaggle_users: usize,
}

/// Team/participant counts for one university
#[derive(Debug, Default, Serialize)]
pub struct UniversityStats {
    pub teams: usize,
    pub participants: usize,
}

/// Per-university drill-down used by the admin dashboard
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UniversityBreakdown {
    pub teams: Vec<TeamSummary>,
    pub total_participants: usize,
    pub year_breakdown: BTreeMap<String, usize>,
}

/// Condensed view of one team inside a university breakdown
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamSummary {
    pub id: String,
    pub team_name: String,
    pub contact_email: String,
    pub member_count: usize,
    pub registration_date: String,
}

/// Compute aggregate statistics over the given registrations
pub fn compute_stats(registrations: &[Registration]) -> RegistrationStats {
    let mut stats = RegistrationStats {
        total_teams: registrations.len(),
        total_participants: 0,
        universities: BTreeMap::new(),
        year_distribution: BTreeMap::new(),
        registrations_by_date: BTreeMap::new(),
        team_size_distribution: (1..=4).map(|size| (size, 0)).collect(),
        ieee_members: 0,
        kaggle_users: 0,
    };

    for registration in registrations {
        let team_size = registration.members.len();
        stats.total_participants += team_size;

        let university = stats
            .universities
            .entry(registration.university.clone())
            .or_default();
        university.teams += 1;
        university.participants += team_size;

        if (1..=4).contains(&team_size) {
            *stats.team_size_distribution.entry(team_size).or_insert(0) += 1;
        }

        *stats
            .registrations_by_date
            .entry(calendar_date(&registration.registration_date))
            .or_insert(0) += 1;

        for member in &registration.members {
            *stats
                .year_distribution
                .entry(member.year_of_study.clone())
                .or_insert(0) += 1;

            if has_value(&member.ieee_number) {
                stats.ieee_members += 1;
            }
            if has_value(&member.kaggle_id) {
                stats.kaggle_users += 1;
            }
        }
    }

    stats
}

/// Group registrations by university with per-team summaries
pub fn university_breakdown(
    registrations: &[Registration],
) -> BTreeMap<String, UniversityBreakdown> {
    let mut breakdown: BTreeMap<String, UniversityBreakdown> = BTreeMap::new();

    for registration in registrations {
        let entry = breakdown
            .entry(registration.university.clone())
            .or_default();

        entry.teams.push(TeamSummary {
            id: registration.id.clone(),
            team_name: registration.team_name.clone(),
            contact_email: registration.contact_email.clone(),
            member_count: registration.members.len(),
            registration_date: registration.registration_date.clone(),
        });
        entry.total_participants += registration.members.len();

        for member in &registration.members {
            *entry
                .year_breakdown
                .entry(member.year_of_study.clone())
                .or_insert(0) += 1;
        }
    }

    breakdown
}

/// Reduce an ISO-8601 timestamp to its calendar date
fn calendar_date(timestamp: &str) -> String {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|parsed| parsed.date_naive().to_string())
        .unwrap_or_else(|_| {
            timestamp
                .split('T')
                .next()
                .unwrap_or(timestamp)
                .to_string()
        })
}

fn has_value(field: &Option<String>) -> bool {
    field.as_deref().is_some_and(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::TeamMember;

    fn member(year: &str, ieee: Option<&str>, kaggle: Option<&str>) -> TeamMember {
        TeamMember {
            full_name: "Member".to_string(),
            email: "m@example.com".to_string(),
            phone: "0710000000".to_string(),
            year_of_study: year.to_string(),
            ieee_number: ieee.map(String::from),
            kaggle_id: kaggle.map(String::from),
        }
    }

    fn registration(id: &str, university: &str, date: &str, members: Vec<TeamMember>) -> Registration {
        Registration {
            id: id.to_string(),
            team_name: format!("Team {}", id),
            university: university.to_string(),
            contact_email: format!("{}@example.com", id),
            members,
            registration_date: date.to_string(),
            status: "registered".to_string(),
        }
    }

    #[test]
    fn test_totals_and_university_counts() {
        let registrations = vec![
            registration(
                "OW_1",
                "U1",
                "2026-08-01T09:00:00+00:00",
                vec![member("1st Year", None, None), member("2nd Year", None, None)],
            ),
            registration(
                "OW_2",
                "U1",
                "2026-08-01T17:00:00+00:00",
                vec![member("2nd Year", None, None)],
            ),
            registration(
                "OW_3",
                "U2",
                "2026-08-02T10:00:00+00:00",
                vec![
                    member("3rd Year", None, None),
                    member("3rd Year", None, None),
                    member("4th Year", None, None),
                ],
            ),
        ];

        let stats = compute_stats(&registrations);

        assert_eq!(stats.total_teams, 3);
        assert_eq!(stats.total_participants, 6);
        assert_eq!(stats.universities.len(), 2);
        assert_eq!(stats.universities["U1"].teams, 2);
        assert_eq!(stats.universities["U1"].participants, 3);
        assert_eq!(stats.universities["U2"].participants, 3);
        assert_eq!(stats.registrations_by_date["2026-08-01"], 2);
        assert_eq!(stats.registrations_by_date["2026-08-02"], 1);
        assert_eq!(stats.year_distribution["2nd Year"], 2);
        assert_eq!(stats.year_distribution["3rd Year"], 2);
    }

    #[test]
    fn test_team_size_distribution_keys_always_present() {
        let stats = compute_stats(&[]);

        assert_eq!(stats.team_size_distribution.len(), 4);
        assert_eq!(stats.team_size_distribution[&1], 0);
        assert_eq!(stats.team_size_distribution[&4], 0);
    }

    #[test]
    fn test_ieee_and_kaggle_counting_ignores_blank_values() {
        let registrations = vec![registration(
            "OW_1",
            "U1",
            "2026-08-01T09:00:00+00:00",
            vec![
                member("1st Year", Some("12345678"), Some("alpha_kaggle")),
                member("1st Year", Some("   "), None),
                member("2nd Year", Some(""), Some("beta_kaggle")),
            ],
        )];

        let stats = compute_stats(&registrations);

        assert_eq!(stats.ieee_members, 1);
        assert_eq!(stats.kaggle_users, 2);
    }

    #[test]
    fn test_university_breakdown() {
        let registrations = vec![
            registration(
                "OW_1",
                "U1",
                "2026-08-01T09:00:00+00:00",
                vec![member("1st Year", None, None), member("2nd Year", None, None)],
            ),
            registration(
                "OW_2",
                "U2",
                "2026-08-02T09:00:00+00:00",
                vec![member("1st Year", None, None)],
            ),
        ];

        let breakdown = university_breakdown(&registrations);

        assert_eq!(breakdown.len(), 2);
        assert_eq!(breakdown["U1"].teams.len(), 1);
        assert_eq!(breakdown["U1"].teams[0].id, "OW_1");
        assert_eq!(breakdown["U1"].teams[0].member_count, 2);
        assert_eq!(breakdown["U1"].total_participants, 2);
        assert_eq!(breakdown["U1"].year_breakdown["1st Year"], 1);
        assert_eq!(breakdown["U2"].total_participants, 1);
    }

    #[test]
    fn test_calendar_date_parsing() {
        assert_eq!(calendar_date("2026-08-05T10:30:00+00:00"), "2026-08-05");
        assert_eq!(calendar_date("2026-08-05T10:30:00Z"), "2026-08-05");
        // Unparseable timestamps degrade to the prefix before the time part
        assert_eq!(calendar_date("2026-08-05Tgarbage"), "2026-08-05");
    }
}
