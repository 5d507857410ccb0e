use candle_core::{Error, Result, Tensor};
use candle_nn::{Init, Linear, VarBuilder, VarMap};
use rand::{rngs::StdRng, Rng, SeedableRng};

//
// Linear layer with torch-equivalent initialisation
//
//   torch.nn.Linear is initialised by Uniform(-1/sqrt(fan_in), 1/sqrt(fan_in)).
//   see https://github.com/pytorch/pytorch/issues/57109
//
pub fn linear(in_dim: usize, out_dim: usize, vs: VarBuilder) -> Result<Linear> {
    let bound = 1.0 / (in_dim as f64).sqrt();
    let init_ws = Init::Uniform { lo: -bound, up: bound };
    let init_bs = Init::Uniform { lo: -bound, up: bound };
    let ws = vs.get_with_hints((out_dim, in_dim), "weight", init_ws)?;
    let bs = vs.get_with_hints(out_dim, "bias", init_bs)?;
    Ok(Linear::new(ws, Some(bs)))
}

/// Re-draws every `*.weight` / `*.bias` in `varmap` from the same uniform
/// distribution as [`linear`], using a seeded generator. Variables are visited
/// in name order so a seed always yields the same parameters.
pub fn seed_parameters(varmap: &VarMap, seed: u64) -> Result<()> {
    let data = varmap
        .data()
        .lock()
        .map_err(|e| Error::Msg(format!("varmap lock poisoned: {e}")))?;
    let mut rng = StdRng::seed_from_u64(seed);
    let mut names: Vec<&String> = data.keys().collect();
    names.sort();
    for name in names {
        let var = &data[name];
        let fan_in = match name.strip_suffix(".bias") {
            Some(prefix) => data
                .get(&format!("{prefix}.weight"))
                .and_then(|w| w.dims().get(1).copied()),
            None => var.dims().get(1).copied(),
        }
        .unwrap_or(1);
        let bound = 1.0 / (fan_in as f32).sqrt();
        let values: Vec<f32> = (0..var.elem_count())
            .map(|_| rng.gen_range(-bound..bound))
            .collect();
        let value = Tensor::from_vec(values, var.dims(), var.device())?.to_dtype(var.dtype())?;
        var.set(&value)?;
    }
    Ok(())
}
