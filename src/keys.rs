//! Object-key and identifier layout.
//!
//! All storage keys and the per-job query id are derived here so the layout
//! lives in one place.

const NAME_ID_SEPARATOR: &str = "::";

/// Prefix under which the enrichment process writes batch result objects.
const RESULT_FOLDER_PREFIX: &str = "KF_RSLT_";

/// `{env}-{region}-{suffix}` bucket naming.
#[must_use]
pub fn bucket_name(env: &str, region: &str, suffix: &str) -> String {
    format!("{env}-{region}-{suffix}")
}

/// Suffix of the bucket holding job input and output objects.
pub const BULK_API_BUCKET: &str = "bulk-api";

/// Suffix of the bucket the enrichment process writes results into.
pub const BULK_RESULT_BUCKET: &str = "bulk-result";

#[must_use]
pub fn file_name_with_id(file_name: &str, file_id: &str) -> String {
    format!("{file_name}{NAME_ID_SEPARATOR}{file_id}")
}

#[must_use]
pub fn input_object_key(file_name: &str, workspace_id: &str, user_id: &str) -> String {
    format!("{workspace_id}/{user_id}/input/{file_name}")
}

#[must_use]
pub fn output_object_key(
    file_name: &str,
    output_file_id: &str,
    workspace_id: &str,
    user_id: &str,
) -> String {
    format!("{workspace_id}/{user_id}/output/{output_file_id}/{file_name}.csv")
}

#[must_use]
pub fn report_object_prefix(output_file_id: &str, workspace_id: &str, user_id: &str) -> String {
    format!("{workspace_id}/{user_id}/output/{output_file_id}/")
}

pub const REPORT_NAME: &str = "report.txt";

/// Temporary per-chunk multipart object, colocated with the final object.
#[must_use]
pub fn temp_chunk_key(final_key: &str, chunk_number: u32) -> String {
    format!("{final_key}temp{chunk_number}")
}

/// Folder the enrichment process writes this job's batch results under.
#[must_use]
pub fn result_folder(workspace_id: &str, api_type: &str, query_id: &str) -> String {
    format!("{RESULT_FOLDER_PREFIX}{workspace_id}/{api_type}/{query_id}")
}

#[must_use]
pub fn result_object_key(folder: &str, batch_field: &str) -> String {
    format!("{folder}/{batch_field}")
}

/// Status-store key identifying one job's batch set.
#[must_use]
pub fn query_id(api_type: &str, file_name: &str, output_file_id: &str) -> String {
    format!("{api_type}-{file_name}-{output_file_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_key_layout() {
        let key = input_object_key(&file_name_with_id("test", "1"), "w1", "user-a");
        assert_eq!(key, "w1/user-a/input/test::1");
    }

    #[test]
    fn output_key_layout() {
        let key = output_object_key("test::1", "out9", "w1", "user-a");
        assert_eq!(key, "w1/user-a/output/out9/test::1.csv");
    }

    #[test]
    fn report_prefix_layout() {
        assert_eq!(report_object_prefix("out9", "w1", "user-a"), "w1/user-a/output/out9/");
    }

    #[test]
    fn bucket_naming() {
        assert_eq!(bucket_name("dev", "us-east-2", BULK_API_BUCKET), "dev-us-east-2-bulk-api");
    }

    #[test]
    fn query_id_layout() {
        assert_eq!(query_id("geocode", "file.csv", "out9"), "geocode-file.csv-out9");
    }
}
