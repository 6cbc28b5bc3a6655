//! Invocation builders for each external stage.
//!
//! Container-side paths and ODM quality flags are fixed policy here; the
//! operator only controls what `RunConfiguration` exposes.
use crate::config::BoundingBox;
use crate::error::{StageExecutionError, StageFailure};
use crate::invocation::{InvocationBuilder, Stage, StageInvocation};
use crate::settings::{Settings, SATELLITE_API_KEY_VAR};
use crate::workspace::{OdmProject, VglWorkspace};

/// Where ODM expects projects inside its container.
pub(crate) const ODM_DATASETS_ROOT: &str = "/datasets";
/// Mount point of the VGL workspace (and the conversion directory).
pub(crate) const CONTAINER_DATA_ROOT: &str = "/data";
/// Speed/quality policy applied to every ODM run.
pub(crate) const ODM_POLICY_FLAGS: [&str; 3] =
    ["--fast-orthophoto", "--skip-band-alignment", "--skip-report"];

const ORTHOPHOTO_TIF: &str = "odm_orthophoto.tif";
const ORTHOPHOTO_PNG: &str = "odm_orthophoto.png";

fn finish(stage: Stage, builder: InvocationBuilder) -> Result<StageInvocation, StageExecutionError> {
    builder.build().map_err(|errors| invalid(stage, errors.join("; ")))
}

fn invalid(stage: Stage, reason: String) -> StageExecutionError {
    StageExecutionError {
        stage: stage.label(),
        failure: StageFailure::Invalid(reason),
    }
}

/// ODM run over `project`, CPU or GPU image.
pub fn orthophoto(
    settings: &Settings,
    project: &OdmProject,
    gsd_cm_per_px: f64,
    use_gpu: bool,
) -> Result<StageInvocation, StageExecutionError> {
    let name = project.name().ok_or_else(|| {
        invalid(
            Stage::Orthophoto,
            format!("{} has no directory name", project.root().display()),
        )
    })?;
    let image = if use_gpu {
        &settings.odm_gpu_image
    } else {
        &settings.odm_image
    };
    let builder = StageInvocation::container(Stage::Orthophoto, settings.runtime.clone(), image.clone())
        .gpus(use_gpu)
        .mount(project.root(), format!("{ODM_DATASETS_ROOT}/{name}"))
        .args(["--project-path", ODM_DATASETS_ROOT])
        .arg("--orthophoto-resolution")
        .arg(gsd_cm_per_px.to_string())
        .args(ODM_POLICY_FLAGS)
        .arg(name);
    finish(Stage::Orthophoto, builder)
}

/// GeoTIFF to PNG with a converter installed on the host.
pub fn local_conversion(
    program: &str,
    project: &OdmProject,
) -> Result<StageInvocation, StageExecutionError> {
    let builder = StageInvocation::host(Stage::OrthophotoConversion, program)
        .args(["-of", "PNG"])
        .arg(project.orthophoto_path().to_string_lossy())
        .arg(project.converted_path().to_string_lossy());
    finish(Stage::OrthophotoConversion, builder)
}

/// GeoTIFF to PNG inside the GDAL container, with the orthophoto directory mounted.
pub fn container_conversion(
    settings: &Settings,
    project: &OdmProject,
) -> Result<StageInvocation, StageExecutionError> {
    let builder = StageInvocation::container(
        Stage::OrthophotoConversion,
        settings.runtime.clone(),
        settings.gdal_image.clone(),
    )
    .mount(&project.orthophoto_dir(), CONTAINER_DATA_ROOT)
    .args(["gdal_translate", "-of", "PNG"])
    .arg(format!("{CONTAINER_DATA_ROOT}/{ORTHOPHOTO_TIF}"))
    .arg(format!("{CONTAINER_DATA_ROOT}/{ORTHOPHOTO_PNG}"));
    finish(Stage::OrthophotoConversion, builder)
}

/// Satellite tile download into `output/stitched/`.
pub fn satellite_download(
    settings: &Settings,
    workspace: &VglWorkspace,
    bbox: &BoundingBox,
    stitch_size: u32,
) -> Result<StageInvocation, StageExecutionError> {
    let (tl_lat, tl_lon) = bbox.top_left();
    let (br_lat, br_lon) = bbox.bottom_right();
    let builder = StageInvocation::container(
        Stage::SatelliteDownload,
        settings.runtime.clone(),
        settings.vgl_image.clone(),
    )
    .mount(workspace.root(), CONTAINER_DATA_ROOT)
    .env_passthrough(SATELLITE_API_KEY_VAR)
    .arg("download-satellite")
    .args(["--top-left-lat".to_string(), tl_lat.to_string()])
    .args(["--top-left-lon".to_string(), tl_lon.to_string()])
    .args(["--bottom-right-lat".to_string(), br_lat.to_string()])
    .args(["--bottom-right-lon".to_string(), br_lon.to_string()])
    .args(["--stitch-size".to_string(), stitch_size.to_string()])
    .args(["--output".to_string(), format!("{CONTAINER_DATA_ROOT}/output")]);
    finish(Stage::SatelliteDownload, builder)
}

/// Visual matching over `query/` and `map/`, results under `output/`.
pub fn matching(
    settings: &Settings,
    workspace: &VglWorkspace,
) -> Result<StageInvocation, StageExecutionError> {
    let builder = StageInvocation::container(
        Stage::Matching,
        settings.runtime.clone(),
        settings.vgl_image.clone(),
    )
    .mount(workspace.root(), CONTAINER_DATA_ROOT)
    .arg("localize")
    .args(["--query".to_string(), format!("{CONTAINER_DATA_ROOT}/query")])
    .args(["--map".to_string(), format!("{CONTAINER_DATA_ROOT}/map")])
    .args(["--output".to_string(), format!("{CONTAINER_DATA_ROOT}/output")]);
    finish(Stage::Matching, builder)
}
