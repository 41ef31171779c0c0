// ============================================================
// Layer 5 - Audio Autoencoder
// ============================================================
// Encoder:  conv(7) → [leaky_relu → strided conv] per stage → conv(3)
// Decoder:  conv(7) → [leaky_relu → transposed conv] per stage → conv(7)
//
// Each stage changes the length by exactly its stride, so
// latents have samples / Π strides frames.

use std::fmt;
use std::str::FromStr;

use burn::{
    nn::{
        conv::{Conv1d, Conv1dConfig, ConvTranspose1d, ConvTranspose1dConfig},
        PaddingConfig1d,
    },
    prelude::*,
    tensor::{
        activation::{leaky_relu, softplus},
        Distribution,
    },
};
use serde::{Deserialize, Serialize};

const LEAKY_SLOPE: f64 = 0.2;

/// How encoder outputs become latents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bottleneck {
    None,
    Tanh,
    Vae,
}

impl Bottleneck {
    fn code(self) -> usize {
        match self {
            Bottleneck::None => 0,
            Bottleneck::Tanh => 1,
            Bottleneck::Vae  => 2,
        }
    }

    fn from_code(code: usize) -> Self {
        match code {
            1 => Bottleneck::Tanh,
            2 => Bottleneck::Vae,
            _ => Bottleneck::None,
        }
    }
}

impl FromStr for Bottleneck {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Bottleneck::None),
            "tanh" => Ok(Bottleneck::Tanh),
            "vae"  => Ok(Bottleneck::Vae),
            other  => Err(format!("unknown bottleneck '{other}' (expected none, tanh or vae)")),
        }
    }
}

impl fmt::Display for Bottleneck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Bottleneck::None => "none",
            Bottleneck::Tanh => "tanh",
            Bottleneck::Vae  => "vae",
        };
        f.write_str(name)
    }
}

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize.
#[derive(Config, Debug)]
pub struct AutoencoderConfig {
    /// Audio channels in and out
    pub in_channels: usize,
    /// Width of the first encoder stage
    pub channels:    usize,
    /// Per-stage width multipliers, one per stride
    pub c_mults:     Vec<usize>,
    /// Per-stage downsampling factors
    pub strides:     Vec<usize>,
    pub latent_dim:  usize,
    pub bottleneck:  Bottleneck,
}

impl AutoencoderConfig {
    pub fn downsampling_ratio(&self) -> usize {
        self.strides.iter().product()
    }

    fn stage_widths(&self) -> Vec<usize> {
        std::iter::once(self.channels)
            .chain(self.c_mults.iter().map(|m| self.channels * m))
            .collect()
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> AudioAutoencoder<B> {
        let widths = self.stage_widths();
        let last   = *widths.last().unwrap_or(&self.channels);
        let encoder_out = match self.bottleneck {
            Bottleneck::Vae => self.latent_dim * 2,
            _ => self.latent_dim,
        };

        // A kernel of 2*s with padding ceil(s/2) maps length L to L/s
        // for any stride s >= 2 when L is a multiple of s.
        let downs = self
            .strides
            .iter()
            .enumerate()
            .map(|(i, &s)| {
                Conv1dConfig::new(widths[i], widths[i + 1], 2 * s)
                    .with_stride(s)
                    .with_padding(PaddingConfig1d::Explicit(s.div_ceil(2)))
                    .init(device)
            })
            .collect();

        let encoder = Encoder {
            input:  same_conv(self.in_channels, self.channels, 7, device),
            downs,
            output: same_conv(last, encoder_out, 3, device),
        };

        // Mirror image: L*s out of L with output padding 2p - s
        let ups = self
            .strides
            .iter()
            .enumerate()
            .rev()
            .map(|(i, &s)| {
                let p = s.div_ceil(2);
                ConvTranspose1dConfig::new([widths[i + 1], widths[i]], 2 * s)
                    .with_stride(s)
                    .with_padding(p)
                    .with_padding_out(2 * p - s)
                    .init(device)
            })
            .collect();

        let decoder = Decoder {
            input:  same_conv(self.latent_dim, last, 7, device),
            ups,
            output: same_conv(self.channels, self.in_channels, 7, device),
        };

        AudioAutoencoder {
            encoder,
            decoder,
            latent_dim: self.latent_dim,
            downsampling_ratio: self.downsampling_ratio(),
            bottleneck_code: self.bottleneck.code(),
        }
    }
}

fn same_conv<B: Backend>(
    channels_in:  usize,
    channels_out: usize,
    kernel:       usize,
    device:       &B::Device,
) -> Conv1d<B> {
    Conv1dConfig::new(channels_in, channels_out, kernel)
        .with_padding(PaddingConfig1d::Explicit(kernel / 2))
        .init(device)
}

#[derive(Module, Debug)]
pub struct Encoder<B: Backend> {
    pub input:  Conv1d<B>,
    pub downs:  Vec<Conv1d<B>>,
    pub output: Conv1d<B>,
}

impl<B: Backend> Encoder<B> {
    /// [batch, channels, samples] → [batch, latent channels, samples / ratio]
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let mut x = self.input.forward(x);
        for down in &self.downs {
            x = down.forward(leaky_relu(x, LEAKY_SLOPE));
        }
        self.output.forward(leaky_relu(x, LEAKY_SLOPE))
    }
}

#[derive(Module, Debug)]
pub struct Decoder<B: Backend> {
    pub input:  Conv1d<B>,
    pub ups:    Vec<ConvTranspose1d<B>>,
    pub output: Conv1d<B>,
}

impl<B: Backend> Decoder<B> {
    pub fn forward(&self, z: Tensor<B, 3>) -> Tensor<B, 3> {
        let mut x = self.input.forward(z);
        for up in &self.ups {
            x = up.forward(leaky_relu(x, LEAKY_SLOPE));
        }
        self.output.forward(leaky_relu(x, LEAKY_SLOPE))
    }
}

/// Side outputs of `encode`.
#[derive(Debug, Clone)]
pub struct EncoderInfo<B: Backend> {
    /// KL divergence to N(0, 1); only set for the VAE bottleneck
    pub kl: Option<Tensor<B, 1>>,
}

#[derive(Module, Debug)]
pub struct AudioAutoencoder<B: Backend> {
    pub encoder: Encoder<B>,
    pub decoder: Decoder<B>,
    pub latent_dim: usize,
    pub downsampling_ratio: usize,
    // Plain integer so the record format only holds primitives
    bottleneck_code: usize,
}

impl<B: Backend> AudioAutoencoder<B> {
    pub fn bottleneck(&self) -> Bottleneck {
        Bottleneck::from_code(self.bottleneck_code)
    }

    /// audio [batch, channels, samples] → latents [batch, latent_dim, samples / ratio]
    pub fn encode(&self, x: Tensor<B, 3>) -> (Tensor<B, 3>, EncoderInfo<B>) {
        let h = self.encoder.forward(x);
        match self.bottleneck() {
            Bottleneck::None => (h, EncoderInfo { kl: None }),
            Bottleneck::Tanh => (h.tanh(), EncoderInfo { kl: None }),
            Bottleneck::Vae  => {
                let [batch, channels, frames] = h.dims();
                let half  = channels / 2;
                let mean  = h.clone().slice([0..batch, 0..half, 0..frames]);
                let scale = h.slice([0..batch, half..channels, 0..frames]);
                let (latents, kl) = vae_sample(mean, scale);
                (latents, EncoderInfo { kl: Some(kl) })
            }
        }
    }

    pub fn decode(&self, latents: Tensor<B, 3>) -> Tensor<B, 3> {
        self.decoder.forward(latents)
    }
}

/// Reparameterised sample and KL(q || N(0, 1)).
///
/// std = softplus(scale) + 1e-4, latents = mean + std * ε,
/// kl = mean over batch and time of Σ_channels (mean² + var - ln var - 1)
pub fn vae_sample<B: Backend>(mean: Tensor<B, 3>, scale: Tensor<B, 3>) -> (Tensor<B, 3>, Tensor<B, 1>) {
    let stdev  = softplus(scale, 1.0).add_scalar(1e-4);
    let var    = stdev.clone().powf_scalar(2.0);
    let logvar = var.clone().log();

    let noise   = Tensor::random(mean.shape(), Distribution::Normal(0.0, 1.0), &mean.device());
    let latents = noise * stdev + mean.clone();

    let kl = (mean.powf_scalar(2.0) + var - logvar)
        .sub_scalar(1.0)
        .sum_dim(1)
        .mean();

    (latents, kl)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TB = NdArray;

    fn tiny(bottleneck: Bottleneck) -> AutoencoderConfig {
        AutoencoderConfig::new(2, 4, vec![2, 2], vec![2, 4], 3, bottleneck)
    }

    #[test]
    fn test_bottleneck_parsing() {
        assert_eq!("VAE".parse::<Bottleneck>().unwrap(), Bottleneck::Vae);
        assert_eq!("tanh".parse::<Bottleneck>().unwrap(), Bottleneck::Tanh);
        assert!("rvq".parse::<Bottleneck>().is_err());
        assert_eq!(Bottleneck::Vae.to_string(), "vae");
    }

    #[test]
    fn test_encode_decode_shapes() {
        let device = Default::default();
        let model: AudioAutoencoder<TB> = tiny(Bottleneck::None).init(&device);
        assert_eq!(model.downsampling_ratio, 8);

        let x = Tensor::<TB, 3>::zeros([2, 2, 64], &device);
        let (latents, info) = model.encode(x);
        assert_eq!(latents.dims(), [2, 3, 8]);
        assert!(info.kl.is_none());
        assert_eq!(model.decode(latents).dims(), [2, 2, 64]);
    }

    #[test]
    fn test_odd_stride_keeps_lengths() {
        let device = Default::default();
        let cfg = AutoencoderConfig::new(1, 4, vec![1, 2], vec![3, 2], 2, Bottleneck::None);
        let model: AudioAutoencoder<TB> = cfg.init(&device);
        let x = Tensor::<TB, 3>::zeros([1, 1, 60], &device);
        let (latents, _) = model.encode(x);
        assert_eq!(latents.dims(), [1, 2, 10]);
        assert_eq!(model.decode(latents).dims(), [1, 1, 60]);
    }

    #[test]
    fn test_vae_reports_kl() {
        let device = Default::default();
        let model: AudioAutoencoder<TB> = tiny(Bottleneck::Vae).init(&device);
        assert_eq!(model.bottleneck(), Bottleneck::Vae);

        let x = Tensor::<TB, 3>::random([2, 2, 64], Distribution::Normal(0.0, 0.5), &device);
        let (latents, info) = model.encode(x);
        assert_eq!(latents.dims(), [2, 3, 8]);
        let kl = info.kl.expect("vae must report kl").into_scalar().elem::<f32>();
        assert!(kl.is_finite() && kl >= 0.0);
    }

    #[test]
    fn test_kl_is_zero_for_standard_normal_posterior() {
        let device = Default::default();
        // softplus(s) + 1e-4 = 1  ⇒  s = ln(e^(1 - 1e-4) - 1)
        let s = ((1.0f64 - 1e-4).exp() - 1.0).ln();
        let mean  = Tensor::<TB, 3>::zeros([1, 4, 5], &device);
        let scale = Tensor::<TB, 3>::zeros([1, 4, 5], &device).add_scalar(s);
        let (_, kl) = vae_sample(mean, scale);
        assert!(kl.into_scalar().elem::<f32>().abs() < 1e-4);
    }

    #[test]
    fn test_tanh_latents_are_bounded() {
        let device = Default::default();
        let model: AudioAutoencoder<TB> = tiny(Bottleneck::Tanh).init(&device);
        let x = Tensor::<TB, 3>::random([1, 2, 64], Distribution::Normal(0.0, 10.0), &device);
        let (latents, _) = model.encode(x);
        let values = latents.into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|v| v.abs() <= 1.0));
    }
}
