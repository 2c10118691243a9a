use std::{convert::TryFrom, path::Path};

use anyhow::{Result, bail};
use tch::{self, Device, Kind, Tensor};

use crate::{
    labels::ClassNames,
    model::{Detection, DetectionModel},
    postprocess::{DecodeParams, decode_rows, non_max_suppression, rescale},
};

/// TorchScript-exported YOLO detector.
pub struct TorchScriptDetector {
    module: tch::CModule,
    device: Device,
    input_size: i64,
    params: DecodeParams,
    names: ClassNames,
}

impl TorchScriptDetector {
    /// Load a TorchScript module onto `device`.
    pub fn load<P: AsRef<Path>>(
        model_path: P,
        device: Device,
        input_size: i64,
        params: DecodeParams,
        names: ClassNames,
    ) -> Result<Self> {
        if !model_path.as_ref().exists() {
            bail!("weights not found at {}", model_path.as_ref().display());
        }
        let mut module = tch::CModule::load_on_device(model_path, device)?;
        module.set_eval();
        Ok(Self {
            module,
            device,
            input_size,
            params,
            names,
        })
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// Converts a BGR frame into a normalised `[1, 3, S, S]` RGB tensor.
    pub fn bgr_to_tensor(&self, bgr: &[u8], width: i32, height: i32) -> Result<Tensor> {
        let expected = (width.max(0) as usize) * (height.max(0) as usize) * 3;
        if expected == 0 || bgr.len() != expected {
            bail!(
                "unexpected frame buffer size: got {} bytes, expected {}",
                bgr.len(),
                expected
            );
        }

        let size = self.input_size;
        let tensor = Tensor::from_slice(bgr)
            .view([height as i64, width as i64, 3])
            .flip([2])
            .permute([2, 0, 1])
            .unsqueeze(0)
            .to_device(self.device)
            .to_kind(Kind::Float)
            / 255.0;

        Ok(tensor.upsample_bilinear2d([size, size], false, None::<f64>, None::<f64>))
    }
}

impl DetectionModel for TorchScriptDetector {
    fn infer(&mut self, bgr: &[u8], width: i32, height: i32) -> Result<Vec<Detection>> {
        let input = self.bgr_to_tensor(bgr, width, height)?;
        let output = tch::no_grad(|| self.module.forward_ts(&[input]))?;
        let shape = output.size();
        if shape.len() != 3 || shape[0] != 1 {
            bail!("unexpected detector output shape: {shape:?}");
        }
        if shape[1] < 5 {
            bail!(
                "detector output requires at least 5 channels (cx,cy,w,h,score), got {}",
                shape[1]
            );
        }

        let preds = output
            .to_device(Device::Cpu)
            .to_kind(Kind::Float)
            .squeeze_dim(0)
            .permute([1, 0])
            .contiguous();
        let rows: Vec<Vec<f32>> = Vec::<Vec<f32>>::try_from(&preds)?;

        let mut detections = non_max_suppression(decode_rows(&rows, &self.params), &self.params);
        let size = self.input_size as f32;
        rescale(
            &mut detections,
            (size, size),
            (width as f32, height as f32),
        );
        Ok(detections)
    }

    fn class_name(&self, class_id: i64) -> String {
        self.names.name(class_id)
    }
}
