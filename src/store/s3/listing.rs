//! ListObjectsV2 response parsing

use crate::error::{StepCacheError, StepCacheResult};
use crate::store::ObjectInfo;
use serde::Deserialize;

/// One page of a bucket listing
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ListPage {
    pub objects: Vec<ObjectInfo>,
    /// Token for the next page; `None` on the last page
    pub next_continuation_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListBucketResult {
    #[serde(default)]
    contents: Vec<Contents>,
    #[serde(default)]
    next_continuation_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Contents {
    key: String,
    size: u64,
}

/// Parse a `ListBucketResult` XML body
pub fn parse_list_page(body: &str) -> StepCacheResult<ListPage> {
    let result: ListBucketResult =
        quick_xml::de::from_str(body).map_err(|e| StepCacheError::ListingParse(e.to_string()))?;

    Ok(ListPage {
        objects: result
            .contents
            .into_iter()
            .map(|c| ObjectInfo {
                key: c.key,
                size: c.size,
            })
            .collect(),
        next_continuation_token: result.next_continuation_token.filter(|t| !t.is_empty()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRUNCATED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Name>bucket</Name>
  <Prefix></Prefix>
  <KeyCount>2</KeyCount>
  <MaxKeys>2</MaxKeys>
  <IsTruncated>true</IsTruncated>
  <Contents>
    <Key>repo-1-lint-abc-manifest.json</Key>
    <LastModified>2024-01-01T00:00:00.000Z</LastModified>
    <ETag>"d41d8cd98f00b204e9800998ecf8427e"</ETag>
    <Size>312</Size>
    <StorageClass>STANDARD</StorageClass>
  </Contents>
  <Contents>
    <Key>repo-1-lint-abc-artifacts.tar.gz</Key>
    <LastModified>2024-01-01T00:00:00.000Z</LastModified>
    <ETag>"0cc175b9c0f1b6a831c399e269772661"</ETag>
    <Size>20480</Size>
    <StorageClass>STANDARD</StorageClass>
  </Contents>
  <NextContinuationToken>1ueGcxLPRx1Tr/XYExHnhbYLgveDs2J/wm36Hy4vbOwM=</NextContinuationToken>
</ListBucketResult>"#;

    const LAST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Name>bucket</Name>
  <IsTruncated>false</IsTruncated>
  <Contents>
    <Key>other</Key>
    <Size>1</Size>
  </Contents>
</ListBucketResult>"#;

    #[test]
    fn parses_truncated_page() {
        let page = parse_list_page(TRUNCATED).unwrap();
        assert_eq!(page.objects.len(), 2);
        assert_eq!(page.objects[0].key, "repo-1-lint-abc-manifest.json");
        assert_eq!(page.objects[1].size, 20480);
        assert_eq!(
            page.next_continuation_token.as_deref(),
            Some("1ueGcxLPRx1Tr/XYExHnhbYLgveDs2J/wm36Hy4vbOwM=")
        );
    }

    #[test]
    fn last_page_has_no_token() {
        let page = parse_list_page(LAST).unwrap();
        assert_eq!(page.objects, vec![ObjectInfo { key: "other".into(), size: 1 }]);
        assert!(page.next_continuation_token.is_none());
    }

    #[test]
    fn empty_bucket() {
        let body = r#"<ListBucketResult><Name>b</Name><KeyCount>0</KeyCount></ListBucketResult>"#;
        assert_eq!(parse_list_page(body).unwrap(), ListPage::default());
    }

    #[test]
    fn malformed_body_is_an_error() {
        assert!(matches!(
            parse_list_page("<ListBucketResult><Contents><Key>k</Key>"),
            Err(StepCacheError::ListingParse(_))
        ));
        assert!(parse_list_page(
            "<ListBucketResult><Contents><Key>k</Key><Size>big</Size></Contents></ListBucketResult>"
        )
        .is_err());
    }
}
