//! CSV export of filtered profiles.

use std::io::{self, Write};
use tracing::info;

use super::service::ProfileDirectory;
use super::types::{Platform, Profile};
use crate::engine::filters::{ProfileFilters, SortSpec};
use crate::engine::pagination::PageRequest;
use crate::error::Result;

/// Header row, in column order.
pub const EXPORT_FIELDS: [&str; 22] = [
  "id",
  "zone",
  "party_district",
  "constituency",
  "designation",
  "name",
  "whatsapp_number",
  "dob",
  "address",
  "email_id",
  "facebook_id",
  "facebook_followers",
  "facebook_active_status",
  "facebook_verified_status",
  "twitter_id",
  "twitter_followers",
  "twitter_active_status",
  "twitter_verified_status",
  "instagram_id",
  "instagram_followers",
  "instagram_active_status",
  "instagram_verified_status",
];

/// Byte order mark so spreadsheet tools detect UTF-8.
const BOM: &str = "\u{feff}";

impl ProfileDirectory {
  /// Write every profile matching `filters`, ordered by id, as CSV.
  ///
  /// Rows are read one page at a time, so memory stays bounded by the page
  /// size however many profiles match. Returns the number of data rows.
  pub async fn export_csv<W: Write>(&self, filters: &ProfileFilters, out: &mut W) -> Result<usize> {
    out.write_all(BOM.as_bytes())?;
    let mut wtr = csv::WriterBuilder::new()
      .terminator(csv::Terminator::CRLF)
      .from_writer(out);
    wtr.write_record(EXPORT_FIELDS).map_err(io::Error::from)?;

    let page_size = self.pagination().max_limit;
    let mut request = PageRequest::new(filters.normalized(), SortSpec::default(), 0, page_size);
    let mut written = 0;
    loop {
      let page = self.paginator().fetch_page(&request).await?;
      for profile in &page.items {
        wtr.write_record(cells(profile)).map_err(io::Error::from)?;
      }
      written += page.items.len();

      match request.after(&page) {
        Some(next) => request = next,
        None => break,
      }
    }

    wtr.flush()?;
    info!(rows = written, "exported profiles");
    Ok(written)
  }
}

fn cells(profile: &Profile) -> Vec<String> {
  let d = &profile.data;
  let text = |v: &Option<String>| v.clone().unwrap_or_default();
  let flag = |v: Option<bool>| v.map(|b| b.to_string()).unwrap_or_default();

  let mut row = vec![
    profile.id.to_string(),
    text(&d.zone),
    text(&d.party_district),
    text(&d.constituency),
    text(&d.designation),
    text(&d.name),
    text(&d.whatsapp_number),
    d.dob.map(|dob| dob.format("%Y-%m-%d").to_string()).unwrap_or_default(),
    text(&d.address),
    text(&d.email_id),
  ];
  for platform in Platform::ALL {
    let account = d.account(platform);
    row.push(text(&account.handle));
    row.push(account.followers.map(|n| n.to_string()).unwrap_or_default());
    row.push(flag(account.active));
    row.push(flag(account.verified));
  }
  row
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::NoopCache;
  use crate::config::Config;
  use crate::test_support::{named, temp_store};
  use std::sync::Arc;

  #[tokio::test]
  async fn test_export_streams_all_matching_rows() {
    let (_dir, store) = temp_store().await;
    let mut config = Config::default();
    config.pagination.max_limit = 2;
    config.pagination.default_limit = 2;
    let directory = ProfileDirectory::new(store, Arc::new(NoopCache), &config);

    for i in 1..=5 {
      let mut data = named(&format!("p{}", i));
      data.zone = Some(if i == 3 { "East" } else { "North" }.into());
      data.address = Some(format!("{} Main St, Apt \"{}\"", i, i));
      if i == 5 {
        data.designation = Some("Ward\nSecretary".into());
      }
      data.facebook.active = Some(i % 2 == 0);
      directory.create_profile(&data).await.unwrap();
    }

    let filters = ProfileFilters {
      zone: Some("North".into()),
      ..Default::default()
    };
    let mut out = Vec::new();
    let rows = directory.export_csv(&filters, &mut out).await.unwrap();
    assert_eq!(rows, 4);

    let text = String::from_utf8(out).unwrap();
    assert!(text.starts_with('\u{feff}'));
    let lines: Vec<&str> = text.trim_start_matches('\u{feff}').split("\r\n").collect();
    assert_eq!(lines[0], EXPORT_FIELDS.join(","));
    assert_eq!(lines.len(), 6); // header, four rows, trailing empty
    assert!(lines[1].starts_with("1,North,,,,p1,,,\"1 Main St, Apt \"\"1\"\"\",,,,false,"));
    assert!(lines[2].starts_with("2,"));
    assert!(lines[3].starts_with("4,"));
    assert!(lines[4].starts_with("5,North,,,\"Ward\nSecretary\",p5,"));
    assert_eq!(lines[1].matches(',').count(), 22);
  }
}
