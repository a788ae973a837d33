//! Serializable description of the LeNet layer stack.
//!
//! The weights are stored by the burn recorder; this is the human readable companion
//! listing each layer, its hyper-parameters, output shape and parameter count.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::LenetConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Relu,
    Softmax,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "class_name")]
pub enum LayerKind {
    Conv2D {
        filters: usize,
        kernel_size: [usize; 2],
        strides: [usize; 2],
        padding: String,
        activation: Activation,
    },
    MaxPooling2D {
        pool_size: [usize; 2],
        strides: [usize; 2],
    },
    Flatten,
    Dense {
        units: usize,
        activation: Activation,
    },
}

impl LayerKind {
    pub fn class_name(&self) -> &'static str {
        match self {
            Self::Conv2D { .. } => "Conv2D",
            Self::MaxPooling2D { .. } => "MaxPooling2D",
            Self::Flatten => "Flatten",
            Self::Dense { .. } => "Dense",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layer {
    pub name: String,
    pub layer: LayerKind,
    /// Output shape without the batch dimension, channels first.
    pub output_shape: Vec<usize>,
    pub params: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelArchitecture {
    pub class_name: String,
    pub name: String,
    /// Input shape without the batch dimension, channels first.
    pub input_shape: Vec<usize>,
    pub layers: Vec<Layer>,
}

impl ModelArchitecture {
    pub fn from_config(config: &LenetConfig) -> Result<Self> {
        let geometry = config.geometry()?;
        let kernel = config.kernel_size;
        let pool = [config.pool_size, config.pool_size];
        let conv = |filters| LayerKind::Conv2D {
            filters,
            kernel_size: [kernel, kernel],
            strides: [1, 1],
            padding: "valid".to_string(),
            activation: Activation::Relu,
        };
        let max_pool = || LayerKind::MaxPooling2D {
            pool_size: pool,
            strides: pool,
        };

        let layers = vec![
            Layer {
                name: "conv2d".to_string(),
                layer: conv(config.conv1_filters),
                output_shape: vec![config.conv1_filters, geometry.conv1, geometry.conv1],
                params: config.conv1_filters * (config.channels * kernel * kernel + 1),
            },
            Layer {
                name: "max_pooling2d".to_string(),
                layer: max_pool(),
                output_shape: vec![config.conv1_filters, geometry.pool1, geometry.pool1],
                params: 0,
            },
            Layer {
                name: "conv2d_1".to_string(),
                layer: conv(config.conv2_filters),
                output_shape: vec![config.conv2_filters, geometry.conv2, geometry.conv2],
                params: config.conv2_filters * (config.conv1_filters * kernel * kernel + 1),
            },
            Layer {
                name: "max_pooling2d_1".to_string(),
                layer: max_pool(),
                output_shape: vec![config.conv2_filters, geometry.pool2, geometry.pool2],
                params: 0,
            },
            Layer {
                name: "flatten".to_string(),
                layer: LayerKind::Flatten,
                output_shape: vec![geometry.flattened],
                params: 0,
            },
            Layer {
                name: "dense".to_string(),
                layer: LayerKind::Dense {
                    units: config.hidden_size,
                    activation: Activation::Relu,
                },
                output_shape: vec![config.hidden_size],
                params: (geometry.flattened + 1) * config.hidden_size,
            },
            Layer {
                name: "dense_1".to_string(),
                layer: LayerKind::Dense {
                    units: config.num_classes,
                    activation: Activation::Softmax,
                },
                output_shape: vec![config.num_classes],
                params: (config.hidden_size + 1) * config.num_classes,
            },
        ];

        Ok(Self {
            class_name: "Sequential".to_string(),
            name: "lenet".to_string(),
            input_shape: vec![config.channels, config.image_size, config.image_size],
            layers,
        })
    }

    pub fn total_params(&self) -> usize {
        self.layers.iter().map(|layer| layer.params).sum()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, self.to_json()?).map_err(|err| Error::io(path, err))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|err| Error::io(path, err))?;

        Ok(serde_json::from_str(&content)?)
    }
}

fn shape(dims: &[usize]) -> String {
    let dims = dims
        .iter()
        .map(|dim| dim.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    format!("(None, {dims})")
}

/// Digits grouped by thousands, `280970` becomes `280,970`.
fn grouped(value: usize) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

impl fmt::Display for ModelArchitecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "_".repeat(65);
        let double = "=".repeat(65);

        writeln!(f, "Model: \"{}\"", self.name)?;
        writeln!(f, "{rule}")?;
        writeln!(f, " {:<28}{:<26}{}", "Layer (type)", "Output Shape", "Param #")?;
        writeln!(f, "{double}")?;
        for (i, layer) in self.layers.iter().enumerate() {
            let name = format!("{} ({})", layer.name, layer.layer.class_name());
            writeln!(
                f,
                " {:<28}{:<26}{}",
                name,
                shape(&layer.output_shape),
                grouped(layer.params)
            )?;
            if i + 1 < self.layers.len() {
                writeln!(f)?;
            }
        }
        writeln!(f, "{double}")?;
        writeln!(f, "Total params: {}", grouped(self.total_params()))?;
        writeln!(f, "Trainable params: {}", grouped(self.total_params()))?;
        writeln!(f, "Non-trainable params: 0")?;
        write!(f, "{rule}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::module::Module;

    #[test]
    fn default_lenet_parameter_counts() {
        let architecture = ModelArchitecture::from_config(&LenetConfig::new()).unwrap();
        let params = architecture
            .layers
            .iter()
            .map(|layer| layer.params)
            .collect::<Vec<_>>();

        assert_eq!(params, vec![520, 0, 20_040, 0, 0, 256_400, 4_010]);
        assert_eq!(architecture.total_params(), 280_970);
    }

    #[test]
    fn parameter_count_matches_module() {
        let device = Default::default();
        let config = LenetConfig::new().with_hidden_size(32).with_conv2_filters(8);
        let model = config.init::<NdArray>(&device).unwrap();
        let architecture = ModelArchitecture::from_config(&config).unwrap();

        assert_eq!(architecture.total_params(), model.num_params());
    }

    #[test]
    fn layer_names_follow_sequential_naming() {
        let architecture = ModelArchitecture::from_config(&LenetConfig::new()).unwrap();
        let names = architecture
            .layers
            .iter()
            .map(|layer| layer.name.as_str())
            .collect::<Vec<_>>();

        assert_eq!(
            names,
            [
                "conv2d",
                "max_pooling2d",
                "conv2d_1",
                "max_pooling2d_1",
                "flatten",
                "dense",
                "dense_1"
            ]
        );
    }

    #[test]
    fn json_carries_layer_class_names() {
        let architecture = ModelArchitecture::from_config(&LenetConfig::new()).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&architecture.to_json().unwrap()).unwrap();

        assert_eq!(json["class_name"], "Sequential");
        assert_eq!(json["layers"][0]["layer"]["class_name"], "Conv2D");
        assert_eq!(json["layers"][0]["layer"]["padding"], "valid");
        assert_eq!(json["layers"][6]["layer"]["activation"], "softmax");
        assert_eq!(json["layers"][4]["output_shape"][0], 640);
    }

    #[test]
    fn saved_file_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let architecture = ModelArchitecture::from_config(&LenetConfig::new()).unwrap();

        architecture.save(&path).unwrap();

        assert_eq!(ModelArchitecture::load(&path).unwrap(), architecture);
    }

    #[test]
    fn summary_lists_layers_and_totals() {
        let summary = ModelArchitecture::from_config(&LenetConfig::new())
            .unwrap()
            .to_string();

        assert!(summary.starts_with("Model: \"lenet\""));
        assert!(summary.contains("conv2d (Conv2D)"));
        assert!(summary.contains("(None, 20, 24, 24)"));
        assert!(summary.contains("Total params: 280,970"));
    }

    #[test]
    fn groups_thousands() {
        assert_eq!(grouped(0), "0");
        assert_eq!(grouped(520), "520");
        assert_eq!(grouped(4_010), "4,010");
        assert_eq!(grouped(1_234_567), "1,234,567");
    }
}
