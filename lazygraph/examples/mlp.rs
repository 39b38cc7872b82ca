use eyre::Result;
use lazygraph::{Dim, Graph, Tensor};

fn main() -> Result<()> {
    let g = Graph::new();

    // a batch of 32 flattened 28x28 images and their one-hot labels
    let input = g.input(&[32, 28 * 28]);
    let expected = g.input(&[32, 10]);

    let output = model(input)?;
    let loss = mse(output, expected)?;

    println!("{g}");
    println!("loss: {loss:?}");

    let dag = g.finish();
    println!("{} nodes, {} inputs", dag.len(), dag.inputs().len());

    Ok(())
}

fn model(x: Tensor<'_>) -> Result<Tensor<'_>> {
    let h0 = dense(x, 16)?;
    let a0 = h0.max(0.0)?; // relu

    let h1 = dense(a0, 16)?;
    let a1 = h1.max(0.0)?;

    let h2 = dense(a1, 10)?;
    Ok(h2.sigmoid())
}

fn dense(x: Tensor<'_>, output_size: Dim) -> Result<Tensor<'_>> {
    let input_size = x.shape().last().copied().unwrap_or(1);

    let g = x.graph();
    let w = g.input(&[input_size, output_size]);
    let b = g.input(&[output_size]);

    Ok((x.matmul(w)? + b)?)
}

fn mse<'g>(output: Tensor<'g>, expected: Tensor<'g>) -> Result<Tensor<'g>> {
    let diff = (output - expected)?;
    let n = diff.shape()[0] as f32;
    Ok((diff ^ 2.0).sum_axis(-1, false)?.sum_all(false) / n)
}
