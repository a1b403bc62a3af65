use std::collections::BTreeMap;

use super::*;
use crate::changes::split_sections;
use crate::layout::DOCUMENT_FILE;
use crate::model::CheckKind;
use crate::util::sha256_bytes;

/// Lowercase, with every run of non-alphanumerics collapsed to `_`, so
/// "Data / API" and `data_api.md` match.
pub fn normalize_section_name(name: &str) -> String {
    let mut normalized = String::with_capacity(name.len());
    let mut pending_separator = false;
    for ch in name.trim().chars() {
        if ch.is_alphanumeric() {
            if pending_separator && !normalized.is_empty() {
                normalized.push('_');
            }
            pending_separator = false;
            normalized.extend(ch.to_lowercase());
        } else {
            pending_separator = true;
        }
    }
    normalized
}

pub fn required_sections_present(manifest: &RunManifest, required: &[String]) -> Vec<QaFinding> {
    let recorded = manifest
        .outputs_of_kind(ArtifactKind::Section)
        .map(|artifact| (normalize_section_name(artifact.name()), artifact.path.as_str()))
        .collect::<Vec<_>>();

    required
        .iter()
        .map(|name| {
            let wanted = normalize_section_name(name);
            match recorded.iter().find(|(recorded_name, _)| *recorded_name == wanted) {
                Some((_, path)) => QaFinding::new(
                    CheckKind::RequiredSectionPresent,
                    Some(name.as_str()),
                    FindingStatus::Pass,
                    format!("section recorded as {path}"),
                ),
                None => QaFinding::new(
                    CheckKind::RequiredSectionPresent,
                    Some(name.as_str()),
                    FindingStatus::Fail,
                    format!("required section '{name}' has no section artifact in the manifest"),
                ),
            }
        })
        .collect()
}

pub fn section_integrity(sections: &[ScannedArtifact<'_>]) -> Vec<QaFinding> {
    if sections.is_empty() {
        return vec![QaFinding::new(
            CheckKind::SectionIntegrity,
            None,
            FindingStatus::Skipped,
            "no section artifacts recorded in the manifest",
        )];
    }

    sections
        .iter()
        .map(|scanned| {
            let artifact = scanned.artifact;
            let (status, detail) = match &scanned.content {
                Err(err) => (
                    FindingStatus::Fail,
                    format!("section file missing or unreadable: {err}"),
                ),
                Ok(raw) if raw.is_empty() => {
                    (FindingStatus::Fail, "section file is empty".to_string())
                }
                Ok(raw) => {
                    let current = sha256_bytes(raw);
                    if current == artifact.sha256 {
                        (
                            FindingStatus::Pass,
                            format!("{} bytes, hash matches manifest", raw.len()),
                        )
                    } else {
                        (
                            FindingStatus::Fail,
                            format!(
                                "stale hash: on-disk {} ({} bytes) differs from recorded {} ({} bytes)",
                                short_hash(&current),
                                raw.len(),
                                short_hash(&artifact.sha256),
                                artifact.bytes
                            ),
                        )
                    }
                }
            };
            QaFinding::new(
                CheckKind::SectionIntegrity,
                Some(artifact.path.as_str()),
                status,
                detail,
            )
        })
        .collect()
}

fn short_hash(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}

pub fn section_headings(
    sections: &[ScannedArtifact<'_>],
    expected: &BTreeMap<String, Vec<String>>,
) -> Vec<QaFinding> {
    let expected = expected
        .iter()
        .map(|(name, headings)| (normalize_section_name(name), headings))
        .collect::<BTreeMap<_, _>>();

    let mut findings = Vec::new();
    for scanned in sections {
        let Some(headings) = expected.get(&normalize_section_name(scanned.artifact.name())) else {
            continue;
        };
        // Unreadable files are reported by the integrity check.
        let Some(text) = scanned.text() else {
            continue;
        };
        let missing = missing_headings(&text, headings);

        findings.push(if missing.is_empty() {
            QaFinding::new(
                CheckKind::SectionHeadings,
                Some(scanned.artifact.path.as_str()),
                FindingStatus::Pass,
                format!("all {} expected headings present", headings.len()),
            )
        } else {
            QaFinding::new(
                CheckKind::SectionHeadings,
                Some(scanned.artifact.path.as_str()),
                FindingStatus::Fail,
                format!("missing headings: {}", missing.join(", ")),
            )
        });
    }

    if findings.is_empty() {
        findings.push(QaFinding::new(
            CheckKind::SectionHeadings,
            None,
            FindingStatus::Skipped,
            "no recorded section has configured headings",
        ));
    }
    findings
}

/// Text of every `## ` heading line.
pub fn h2_headings(text: &str) -> Vec<&str> {
    text.lines()
        .filter_map(|line| line.trim_start().strip_prefix("## "))
        .map(str::trim)
        .collect()
}

/// Expected headings with no `## <heading>` line (prefix match) in `text`.
pub fn missing_headings<'h>(text: &str, headings: &'h [String]) -> Vec<&'h str> {
    let present = h2_headings(text);
    headings
        .iter()
        .filter(|heading| !present.iter().any(|line| line.starts_with(heading.as_str())))
        .map(String::as_str)
        .collect()
}

pub fn document_present(documents: &[ScannedArtifact<'_>]) -> QaFinding {
    let subject = Some(DOCUMENT_FILE);
    let Some(document) = documents.first() else {
        return QaFinding::new(
            CheckKind::DocumentPresent,
            subject,
            FindingStatus::Fail,
            format!("missing output: no {DOCUMENT_FILE} recorded in the manifest"),
        );
    };
    match &document.content {
        Err(err) => QaFinding::new(
            CheckKind::DocumentPresent,
            subject,
            FindingStatus::Fail,
            format!("missing output: {DOCUMENT_FILE} unreadable: {err}"),
        ),
        Ok(raw) if raw.iter().all(u8::is_ascii_whitespace) => QaFinding::new(
            CheckKind::DocumentPresent,
            subject,
            FindingStatus::Fail,
            format!("missing output: {DOCUMENT_FILE} is empty"),
        ),
        Ok(raw) => QaFinding::new(
            CheckKind::DocumentPresent,
            subject,
            FindingStatus::Pass,
            format!("{} bytes", raw.len()),
        ),
    }
}

/// One failing finding per required document heading that is absent.
pub fn document_headings(documents: &[ScannedArtifact<'_>], required: &[String]) -> Vec<QaFinding> {
    let text = documents
        .first()
        .and_then(ScannedArtifact::text)
        .filter(|text| !text.trim().is_empty());
    let Some(text) = text else {
        return vec![QaFinding::new(
            CheckKind::DocumentHeadings,
            None,
            FindingStatus::Skipped,
            "no readable design document",
        )];
    };
    if required.is_empty() {
        return vec![QaFinding::new(
            CheckKind::DocumentHeadings,
            None,
            FindingStatus::Skipped,
            "no document headings configured",
        )];
    }

    let missing = missing_headings(&text, required);
    if missing.is_empty() {
        return vec![QaFinding::new(
            CheckKind::DocumentHeadings,
            None,
            FindingStatus::Pass,
            format!("all {} required headings present", required.len()),
        )];
    }
    missing
        .into_iter()
        .map(|heading| {
            QaFinding::new(
                CheckKind::DocumentHeadings,
                Some(heading),
                FindingStatus::Fail,
                format!("missing required section '## {heading}'"),
            )
        })
        .collect()
}

pub fn placeholder_absence<'a, 'b: 'a>(
    scanned: impl Iterator<Item = &'a ScannedArtifact<'b>>,
    markers: &[String],
) -> Vec<QaFinding> {
    if markers.is_empty() {
        return vec![QaFinding::new(
            CheckKind::PlaceholderAbsence,
            None,
            FindingStatus::Skipped,
            "no placeholder markers configured",
        )];
    }

    let mut findings = Vec::new();
    let mut scanned_count = 0_usize;
    for item in scanned {
        let Some(text) = item.text() else {
            continue;
        };
        scanned_count += 1;
        for marker in markers.iter().filter(|marker| !marker.is_empty()) {
            if let Some(line) = first_line_containing(&text, marker) {
                findings.push(QaFinding::new(
                    CheckKind::PlaceholderAbsence,
                    Some(item.artifact.path.as_str()),
                    FindingStatus::Fail,
                    format!("unresolved placeholder \"{marker}\" at line {line}"),
                ));
            }
        }
    }

    if findings.is_empty() {
        findings.push(QaFinding::new(
            CheckKind::PlaceholderAbsence,
            None,
            FindingStatus::Pass,
            format!("no placeholder markers in {scanned_count} scanned files"),
        ));
    }
    findings
}

fn first_line_containing(text: &str, marker: &str) -> Option<usize> {
    text.lines()
        .position(|line| line.contains(marker))
        .map(|index| index + 1)
}

pub fn prior_qa_continuity(
    document_text: &str,
    prior: &PriorArtifacts,
    sections: &[String],
    markers: &[String],
) -> QaFinding {
    let finding = |status, detail: String| {
        QaFinding::new(CheckKind::PriorQaContinuity, None, status, detail)
    };

    if prior.is_first_run() {
        return finding(
            FindingStatus::Skipped,
            "first run: no prior manifest or QA report available".to_string(),
        );
    }
    if let Some(err) = &prior.manifest_error {
        return finding(
            FindingStatus::Fail,
            format!("previous run manifest carried forward is unreadable: {err}"),
        );
    }
    if prior
        .qa_report
        .as_ref()
        .is_some_and(|raw| raw.iter().all(u8::is_ascii_whitespace))
    {
        return finding(
            FindingStatus::Fail,
            "previous QA report carried forward is empty".to_string(),
        );
    }

    let haystack = document_text.to_lowercase();
    let marker = markers
        .iter()
        .filter(|marker| !marker.trim().is_empty())
        .find(|marker| haystack.contains(&marker.to_lowercase()));
    if let Some(marker) = marker {
        return finding(
            FindingStatus::Pass,
            format!("document cross-references the prior QA report via \"{marker}\""),
        );
    }

    let acknowledged = split_sections(document_text)
        .into_iter()
        .find(|(title, body)| {
            let title = title.to_lowercase();
            sections
                .iter()
                .any(|section| title.starts_with(&section.to_lowercase()))
                && mentions_prior_review(body)
        });
    match acknowledged {
        Some((title, _)) => finding(
            FindingStatus::Pass,
            format!("'{title}' section acknowledges the prior QA report"),
        ),
        None => finding(
            FindingStatus::Fail,
            format!(
                "document does not acknowledge the prior QA report; expected one of {} or a {} section mentioning the previous QA or review report",
                markers
                    .iter()
                    .map(|marker| format!("\"{marker}\""))
                    .collect::<Vec<_>>()
                    .join(", "),
                sections
                    .iter()
                    .map(|section| format!("'## {section}'"))
                    .collect::<Vec<_>>()
                    .join(" or ")
            ),
        ),
    }
}

/// A section body that talks about a prior/previous QA or review report.
fn mentions_prior_review(body: &str) -> bool {
    let text = body.to_lowercase();
    let names_prior = text.contains("prior") || text.contains("previous");
    let names_report = text.contains("qa report") || text.contains("review report");
    names_prior && names_report
}
