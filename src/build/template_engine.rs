//! Rendering of the worker entrypoint script and container build file
//!
//! Both artifacts are pure functions of a [`BuildSpec`]; nothing here touches
//! the filesystem or the build client.

use std::path::Path;
use tracing::debug;

use crate::config::WorkerRuntime;
use crate::domain::entities::RunId;
use crate::executor::WorkerCodec;
use crate::storage::ArtifactLocation;

/// Materials for one task image
#[derive(Debug, Clone, PartialEq)]
pub struct BuildSpec {
    pub run_id: RunId,
    pub base_image: String,
    /// Working directory inside the container
    pub working_dir: String,
    pub function_key: String,
    pub result_key: String,
    pub location: ArtifactLocation,
    pub runtime: WorkerRuntime,
    /// Payload and result format, matching the submitter's serializer
    pub codec: WorkerCodec,
}

impl BuildSpec {
    pub fn new(
        run_id: RunId,
        base_image: impl Into<String>,
        working_dir: impl Into<String>,
        location: ArtifactLocation,
        runtime: WorkerRuntime,
        codec: WorkerCodec,
    ) -> Self {
        Self {
            function_key: run_id.function_key(),
            result_key: run_id.result_key(),
            run_id,
            base_image: base_image.into(),
            working_dir: working_dir.into(),
            location,
            runtime,
            codec,
        }
    }

    /// Directory the worker reads the payload from and writes the result to.
    ///
    /// For a shared path this is the mounted directory itself; bucket
    /// artifacts are staged in the working directory.
    pub fn data_dir(&self) -> String {
        match &self.location {
            ArtifactLocation::SharedPath(root) => root.display().to_string(),
            ArtifactLocation::Bucket { .. } => self.working_dir.clone(),
        }
    }

    pub fn entrypoint_filename(&self) -> String {
        self.run_id.entrypoint_filename()
    }
}

/// The two generated text artifacts
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedBuild {
    pub entrypoint_filename: String,
    pub entrypoint: String,
    pub build_file: String,
}

/// Quote `value` as a string literal. JSON string syntax is also valid in
/// the entrypoint language and in exec-form build instructions.
fn quote(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

pub struct TemplateEngine;

impl TemplateEngine {
    pub fn render(spec: &BuildSpec) -> RenderedBuild {
        debug!(run_id = %spec.run_id, "Rendering build templates");
        RenderedBuild {
            entrypoint_filename: spec.entrypoint_filename(),
            entrypoint: Self::render_entrypoint(spec),
            build_file: Self::render_build_file(spec),
        }
    }

    pub fn render_entrypoint(spec: &BuildSpec) -> String {
        let mut script = format!(
            r#"import os
{imports}
data_dir = {data_dir}
func_path = os.path.join(data_dir, {function_key})
result_path = os.path.join(data_dir, {result_key})
"#,
            imports = spec.codec.imports,
            data_dir = quote(&spec.data_dir()),
            function_key = quote(&spec.function_key),
            result_key = quote(&spec.result_key),
        );

        if let ArtifactLocation::Bucket { bucket, .. } = &spec.location {
            script.push_str(&format!(
                r#"
import boto3

s3 = boto3.client("s3")
s3.download_file({bucket}, {function_object}, func_path)
"#,
                bucket = quote(bucket),
                function_object = quote(&spec.location.object_key(&spec.function_key)),
            ));
        }

        script.push_str(&format!(
            r#"
{load_task}
result = function(*args, **kwargs)

partial_path = result_path + ".partial"
{dump_result}os.replace(partial_path, result_path)
"#,
            load_task = spec.codec.load_task,
            dump_result = spec.codec.dump_result,
        ));

        if let ArtifactLocation::Bucket { bucket, .. } = &spec.location {
            script.push_str(&format!(
                r#"
s3.upload_file(result_path, {bucket}, {result_object})
"#,
                bucket = quote(bucket),
                result_object = quote(&spec.location.object_key(&spec.result_key)),
            ));
        }

        script
    }

    pub fn render_build_file(spec: &BuildSpec) -> String {
        let mut packages = vec![spec.runtime.serializer_package.as_str()];
        if !spec.location.is_shared_path() {
            packages.push(spec.runtime.object_store_package.as_str());
        }

        let entrypoint = spec.entrypoint_filename();
        let script_path = Path::new(&spec.working_dir).join(&entrypoint);

        format!(
            r#"FROM {base_image}

RUN pip install --no-cache-dir {packages}

WORKDIR {working_dir}

COPY {entrypoint} {script_path}

ENTRYPOINT [ {interpreter} ]
CMD [ {script} ]
"#,
            base_image = spec.base_image,
            packages = packages.join(" "),
            working_dir = spec.working_dir,
            entrypoint = entrypoint,
            script_path = script_path.display(),
            interpreter = quote(&spec.runtime.interpreter),
            script = quote(&script_path.display().to_string()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{JsonTaskSerializer, TaskSerializer};

    fn spec(location: &str) -> BuildSpec {
        BuildSpec::new(
            RunId::derive("dispatch", "node"),
            "python:3.8-slim-bullseye",
            "/opt/kube-task",
            ArtifactLocation::parse(location).unwrap(),
            WorkerRuntime::default(),
            JsonTaskSerializer.worker_codec(),
        )
    }

    #[test]
    fn test_shared_path_entrypoint_reads_mounted_directory() {
        let spec = spec("/mnt/shared");
        let script = TemplateEngine::render_entrypoint(&spec);

        assert!(script.contains(r#"data_dir = "/mnt/shared""#));
        assert!(script.contains(&format!("\"{}\"", spec.function_key)));
        assert!(script.contains("function(*args, **kwargs)"));
        assert!(script.contains("payload = json.load(f)"));
        assert!(script.contains("json.dump(result, f)"));
        assert!(script.contains("os.replace(partial_path, result_path)"));
        assert!(!script.contains("boto3"));
    }

    #[test]
    fn test_entrypoint_uses_serializer_codec() {
        let mut spec = spec("/tmp");
        spec.codec = WorkerCodec {
            imports: "import marshal\n".to_string(),
            load_task: "function, args, kwargs = marshal.load(open(func_path, \"rb\"))\n".to_string(),
            dump_result: "marshal.dump(result, open(partial_path, \"wb\"))\n".to_string(),
        };
        let script = TemplateEngine::render_entrypoint(&spec);

        assert!(script.starts_with("import os\nimport marshal\n"));
        let load = script.find("marshal.load(").unwrap();
        let call = script.find("result = function(*args, **kwargs)").unwrap();
        let dump = script.find("marshal.dump(").unwrap();
        let replace = script.find("os.replace(partial_path, result_path)").unwrap();
        assert!(load < call && call < dump && dump < replace);
        assert!(!script.contains("json"));
    }

    #[test]
    fn test_bucket_entrypoint_downloads_and_uploads() {
        let spec = spec("s3://artifacts/runs");
        let script = TemplateEngine::render_entrypoint(&spec);

        assert!(script.contains(r#"data_dir = "/opt/kube-task""#));
        assert!(script.contains(&format!(
            r#"s3.download_file("artifacts", "runs/{}", func_path)"#,
            spec.function_key
        )));
        assert!(script.contains(&format!(
            r#"s3.upload_file(result_path, "artifacts", "runs/{}")"#,
            spec.result_key
        )));

        let download = script.find("download_file").unwrap();
        let call = script.find("function(*args").unwrap();
        let upload = script.find("upload_file").unwrap();
        assert!(download < call && call < upload);
    }

    #[test]
    fn test_build_file_installs_object_store_client_only_for_buckets() {
        let shared = TemplateEngine::render_build_file(&spec("/tmp"));
        assert!(shared.starts_with("FROM python:3.8-slim-bullseye\n"));
        assert!(shared.contains("RUN pip install --no-cache-dir cloudpickle==2.0.0\n"));
        assert!(!shared.contains("boto3"));

        let bucket = TemplateEngine::render_build_file(&spec("s3://b"));
        assert!(bucket.contains("cloudpickle==2.0.0 boto3==1.20.48"));
    }

    #[test]
    fn test_build_file_copies_and_runs_entrypoint() {
        let spec = spec("/tmp");
        let build_file = TemplateEngine::render_build_file(&spec);
        let entrypoint = spec.entrypoint_filename();

        assert!(build_file.contains("WORKDIR /opt/kube-task\n"));
        assert!(build_file.contains(&format!("COPY {} /opt/kube-task/{}\n", entrypoint, entrypoint)));
        assert!(build_file.contains(r#"ENTRYPOINT [ "python" ]"#));
        assert!(build_file.contains(&format!(r#"CMD [ "/opt/kube-task/{}" ]"#, entrypoint)));
    }

    #[test]
    fn test_rendering_is_deterministic() {
        assert_eq!(TemplateEngine::render(&spec("/tmp")), TemplateEngine::render(&spec("/tmp")));
    }

    #[test]
    fn test_quotes_are_escaped() {
        let mut spec = spec("/tmp");
        spec.function_key = "we\"ird".to_string();
        let script = TemplateEngine::render_entrypoint(&spec);
        assert!(script.contains(r#""we\"ird""#));
    }
}
