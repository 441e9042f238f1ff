//! Row model for the legacy platform's JSON table exports.
//!
//! The source system dumps its SQL tables as loose JSON arrays with
//! string-typed foreign keys and no referential integrity. Joins are
//! simulated here: first match in array order wins, and a missing match is
//! a valid `None` outcome consumed by classification, never an error.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One row of the participant table export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantRow {
    /// Table row ID, referenced by the join tables.
    #[serde(default)]
    pub id: Option<String>,
    /// The participant's raw Arc ID (0 to 6 digits, unpadded).
    #[serde(default)]
    pub participant_id: String,
    /// Only populated in QA data sets.
    #[serde(default)]
    pub name: Option<String>,
    /// Table row id of the study this participant belongs to.
    #[serde(default)]
    pub study_id: Option<String>,
}

/// One row of the site-location table export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteLocationRow {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub contact_phone: Option<String>,
    #[serde(default)]
    pub contact_email: Option<String>,
}

/// One row of the rater table export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaterRow {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub study_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Join-table row linking a participant to a site location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantSiteLocationRow {
    #[serde(default)]
    pub id: Option<String>,
    /// `ParticipantRow.id` of the joined participant.
    #[serde(default)]
    pub participant: Option<String>,
    /// `SiteLocationRow.id` of the joined site.
    #[serde(default)]
    pub site_location: Option<String>,
}

/// Join-table row linking a participant to the rater who registered them.
///
/// A participant may have several of these; the resolver takes the first
/// array match and never consults `created_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantRaterRow {
    /// `RaterRow.id` of the registering rater.
    #[serde(default)]
    pub registered_by: Option<String>,
    /// `ParticipantRow.id` of the joined participant.
    #[serde(default)]
    pub participant: Option<String>,
    /// Registration time, epoch seconds.
    #[serde(default)]
    pub created_at: Option<f64>,
}

/// Phone row. Absent entirely for the study type that has no phone numbers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantPhoneRow {
    #[serde(default)]
    pub id: Option<String>,
    /// `ParticipantRow.id` of the joined participant.
    #[serde(default)]
    pub participant_id: Option<String>,
    /// Internationally formatted, always starting with "+".
    #[serde(default)]
    pub phone: Option<String>,
}

/// Device-id row, written when the participant first signed in on the
/// legacy mobile app.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantDeviceIdRow {
    #[serde(default)]
    pub id: Option<String>,
    /// `ParticipantRow.id` of the joined participant.
    #[serde(default)]
    pub participant: Option<String>,
    /// The participant's most recent device id (a UUID).
    #[serde(default)]
    pub device_id: Option<String>,
    /// When this device id was created, epoch seconds.
    #[serde(default)]
    pub created_at: Option<f64>,
}

/// Free-form notes row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantNotesRow {
    #[serde(default)]
    pub id: Option<String>,
    /// `ParticipantRow.id` of the joined participant.
    #[serde(default)]
    pub participant: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

/// The joins resolved for one participant row.
#[derive(Debug, Clone, Default)]
pub struct ResolvedJoins<'a> {
    pub site: Option<&'a SiteLocationRow>,
    pub rater: Option<&'a RaterRow>,
    pub phone: Option<&'a ParticipantPhoneRow>,
    pub device_id: Option<&'a ParticipantDeviceIdRow>,
    pub notes: Option<&'a ParticipantNotesRow>,
}

/// All row arrays loaded from one participant export.
///
/// Arrays that were missing from the export stay empty; every lookup over
/// an empty array is simply a `None`.
#[derive(Debug, Clone, Default)]
pub struct RowSet {
    pub participants: Vec<ParticipantRow>,
    pub site_locations: Vec<SiteLocationRow>,
    pub raters: Vec<RaterRow>,
    pub participant_site_locations: Vec<ParticipantSiteLocationRow>,
    pub participant_raters: Vec<ParticipantRaterRow>,
    pub participant_phones: Vec<ParticipantPhoneRow>,
    pub participant_device_ids: Vec<ParticipantDeviceIdRow>,
    pub participant_notes: Vec<ParticipantNotesRow>,
}

impl RowSet {
    /// Build a join resolver over this row set.
    ///
    /// The target-table indexes are built once here; call this once per
    /// batch rather than per participant.
    #[must_use]
    pub fn resolver(&self) -> JoinResolver<'_> {
        JoinResolver {
            rows: self,
            index: RowIndex::new(self),
        }
    }
}

/// Simulates the relational joins for one participant row at a time.
pub struct JoinResolver<'a> {
    rows: &'a RowSet,
    index: RowIndex<'a>,
}

impl<'a> JoinResolver<'a> {
    /// Resolve every join for one participant row id.
    #[must_use]
    pub fn resolve(&self, participant_row_id: &str) -> ResolvedJoins<'a> {
        ResolvedJoins {
            site: self.find_site_location(participant_row_id),
            rater: self.find_rater(participant_row_id),
            phone: self.find_phone(participant_row_id),
            device_id: self.find_device_id(participant_row_id),
            notes: self.find_notes(participant_row_id),
        }
    }

    /// First site location reachable through the site-location join table.
    fn find_site_location(&self, participant_row_id: &str) -> Option<&'a SiteLocationRow> {
        self.rows
            .participant_site_locations
            .iter()
            .filter(|link| link.participant.as_deref() == Some(participant_row_id))
            .find_map(|link| {
                link.site_location
                    .as_deref()
                    .and_then(|site_id| self.index.sites_by_id.get(site_id).copied())
            })
    }

    /// First rater reachable through the rater join table.
    ///
    /// Multiple registration rows per participant are legal; the first array
    /// match wins regardless of `created_at`.
    fn find_rater(&self, participant_row_id: &str) -> Option<&'a RaterRow> {
        self.rows
            .participant_raters
            .iter()
            .filter(|link| link.participant.as_deref() == Some(participant_row_id))
            .find_map(|link| {
                link.registered_by
                    .as_deref()
                    .and_then(|rater_id| self.index.raters_by_id.get(rater_id).copied())
            })
    }

    fn find_phone(&self, participant_row_id: &str) -> Option<&'a ParticipantPhoneRow> {
        self.rows
            .participant_phones
            .iter()
            .find(|row| row.participant_id.as_deref() == Some(participant_row_id))
    }

    fn find_device_id(&self, participant_row_id: &str) -> Option<&'a ParticipantDeviceIdRow> {
        self.rows
            .participant_device_ids
            .iter()
            .find(|row| row.participant.as_deref() == Some(participant_row_id))
    }

    fn find_notes(&self, participant_row_id: &str) -> Option<&'a ParticipantNotesRow> {
        self.rows
            .participant_notes
            .iter()
            .find(|row| row.participant.as_deref() == Some(participant_row_id))
    }
}

/// Row-id indexes over the target tables, built once per batch.
///
/// Insertion is first-wins so that a duplicated target row id resolves to
/// the earliest array entry, matching the linear-scan semantics of the
/// system this replaces.
struct RowIndex<'a> {
    sites_by_id: HashMap<&'a str, &'a SiteLocationRow>,
    raters_by_id: HashMap<&'a str, &'a RaterRow>,
}

impl<'a> RowIndex<'a> {
    fn new(rows: &'a RowSet) -> Self {
        let mut sites_by_id = HashMap::new();
        for site in &rows.site_locations {
            if let Some(id) = site.id.as_deref() {
                sites_by_id.entry(id).or_insert(site);
            }
        }
        let mut raters_by_id = HashMap::new();
        for rater in &rows.raters {
            if let Some(id) = rater.id.as_deref() {
                raters_by_id.entry(id).or_insert(rater);
            }
        }
        Self {
            sites_by_id,
            raters_by_id,
        }
    }
}
